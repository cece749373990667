use crate::stops::StopLevels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trading::{OrderOrigin, OrderRequest, Side, SignalId};

/// Per-signal market inputs gathered by the strategy runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalInputs {
    pub volatility: Option<f64>,
    pub atr: Option<f64>,
    pub expected_return: Option<f64>,
    /// Upper bound on quantity suggested by the strategy itself.
    pub size_hint: Option<f64>,
}

/// Sized, risk-checked verdict on one signal. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub signal_id: SignalId,
    pub symbol: String,
    pub side: Option<Side>,
    pub price: f64,
    /// Whole units, possibly zero.
    pub approved_quantity: f64,
    pub stops: Option<StopLevels>,
    pub sizing_method: String,
    pub fraction: f64,
    pub rejection: Option<String>,
    /// Set when a policy reduced the sized quantity without rejecting it.
    pub adjustment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl RiskDecision {
    pub fn rejected(
        signal_id: SignalId,
        symbol: impl Into<String>,
        side: Option<Side>,
        price: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            signal_id,
            symbol: symbol.into(),
            side,
            price,
            approved_quantity: 0.0,
            stops: None,
            sizing_method: String::new(),
            fraction: 0.0,
            rejection: Some(reason.into()),
            adjustment: None,
            decided_at: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.rejection.is_none() && self.side.is_some() && self.approved_quantity >= 1.0
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stops.map(|s| s.stop_loss)
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.stops.map(|s| s.take_profit)
    }

    /// Market order intent for an approved decision.
    pub fn order_request(&self, origin: OrderOrigin) -> Option<OrderRequest> {
        if !self.is_approved() {
            return None;
        }
        let side = self.side?;
        Some(
            OrderRequest::market(self.symbol.clone(), side, self.approved_quantity, origin)
                .with_signal(self.signal_id),
        )
    }
}
