use super::order::OrderState;
use serde::{Deserialize, Serialize};

/// Immediate answer of the broker to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    Accepted { broker_order_id: String },
    Rejected { reason: String },
}

/// Broker-side view of an order. Quantities and fees are cumulative since submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderStatus {
    pub state: OrderState,
    pub filled_quantity: f64,
    pub average_price: f64,
    pub fees: f64,
    pub message: Option<String>,
}

impl BrokerOrderStatus {
    pub fn new(state: OrderState) -> Self {
        Self {
            state,
            filled_quantity: 0.0,
            average_price: 0.0,
            fees: 0.0,
            message: None,
        }
    }

    pub fn with_fill(mut self, filled_quantity: f64, average_price: f64, fees: f64) -> Self {
        self.filled_quantity = filled_quantity;
        self.average_price = average_price;
        self.fees = fees;
        self
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}
