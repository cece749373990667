use super::identity::{FillId, OrderId};
use super::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A confirmed (partial or full) execution of an order. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub fees: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn new(
        order_id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        quantity: f64,
        price: f64,
        fees: f64,
    ) -> Self {
        Self {
            id: FillId::new(),
            order_id,
            symbol: symbol.into(),
            side,
            quantity,
            price,
            fees,
            timestamp: Utc::now(),
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    /// Signed cash impact: buys pay notional plus fees, sells receive notional minus fees.
    pub fn cash_delta(&self) -> f64 {
        -self.side.sign() * self.notional() - self.fees
    }
}

impl crate::traits::repository::Entity for Fill {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn owner(&self) -> Option<String> {
        Some(self.order_id.to_string())
    }
}
