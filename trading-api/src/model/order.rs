use super::identity::{ExecutionId, SignalId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `+1.0` for buys, `-1.0` for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// Stop-limit: needs both a limit price and a trigger price.
    StopLoss,
    StopLossMarket,
    /// Take-profit limit: needs both a limit price and a trigger price.
    TakeProfit,
    TakeProfitMarket,
}

impl OrderType {
    pub fn requires_price(&self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::StopLoss | OrderType::TakeProfit
        )
    }

    pub fn requires_trigger(&self) -> bool {
        matches!(
            self,
            OrderType::StopLoss
                | OrderType::StopLossMarket
                | OrderType::TakeProfit
                | OrderType::TakeProfitMarket
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    #[default]
    Day,
    /// Immediate or cancel.
    Ioc,
    /// Good till cancelled.
    Gtc,
}

/// Lifecycle of an order inside the execution pipeline.
///
/// ```text
/// PENDING -> SUBMITTED -> { PARTIALLY_FILLED -> FILLED | REJECTED | CANCELLED | EXPIRED | ERROR }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
    Expired,
    Error,
}

impl OrderState {
    pub const ALL: [OrderState; 8] = [
        OrderState::Pending,
        OrderState::Submitted,
        OrderState::PartiallyFilled,
        OrderState::Filled,
        OrderState::Rejected,
        OrderState::Cancelled,
        OrderState::Expired,
        OrderState::Error,
    ];

    /// Returns whether `self -> next` is a legal edge of the lifecycle.
    ///
    /// Transitions never regress. The only self-loop is `PARTIALLY_FILLED`, which
    /// repeats while further partial fills arrive.
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Pending, Submitted | Cancelled | Error)
                | (
                    Submitted,
                    PartiallyFilled | Filled | Rejected | Cancelled | Expired | Error
                )
                | (
                    PartiallyFilled,
                    PartiallyFilled | Filled | Cancelled | Expired | Error
                )
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled
                | OrderState::Rejected
                | OrderState::Cancelled
                | OrderState::Expired
                | OrderState::Error
        )
    }

    /// `cancel` and `modify` are only accepted from these states.
    pub fn is_amendable(self) -> bool {
        matches!(self, OrderState::Pending | OrderState::Submitted)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderState::Pending => "PENDING",
            OrderState::Submitted => "SUBMITTED",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Rejected => "REJECTED",
            OrderState::Cancelled => "CANCELLED",
            OrderState::Expired => "EXPIRED",
            OrderState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Who asked for an order. Used to enforce one unresolved order per origin and symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOrigin {
    Execution(ExecutionId),
    Manual,
    Rebalancer,
}

impl fmt::Display for OrderOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderOrigin::Execution(id) => write!(f, "execution:{}", id),
            OrderOrigin::Manual => write!(f, "manual"),
            OrderOrigin::Rebalancer => write!(f, "rebalancer"),
        }
    }
}

/// An order intent as handed to the pipeline and forwarded to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub validity: Validity,
    pub origin: OrderOrigin,
    pub signal_id: Option<SignalId>,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64, origin: OrderOrigin) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            trigger_price: None,
            validity: Validity::Day,
            origin,
            signal_id: None,
            tag: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: f64,
        price: f64,
        origin: OrderOrigin,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity, origin)
        }
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_trigger(mut self, trigger_price: f64) -> Self {
        self.trigger_price = Some(trigger_price);
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_signal(mut self, signal_id: SignalId) -> Self {
        self.signal_id = Some(signal_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn notional(&self, reference_price: f64) -> f64 {
        self.quantity * self.price.unwrap_or(reference_price)
    }
}
