use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use trading::{Entity, OrderId, OrderOrigin, OrderRequest, OrderState, Result, TradingError};

/// An order as tracked by the pipeline. Mutated only by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    request: OrderRequest,
    state: OrderState,
    /// Global admission sequence. Equal to the order's position in the FIFO queue.
    sequence: u64,
    filled_quantity: f64,
    average_fill_price: f64,
    fees: f64,
    broker_order_id: Option<String>,
    message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, request: OrderRequest, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            request,
            state: OrderState::Pending,
            sequence,
            filled_quantity: 0.0,
            average_fill_price: 0.0,
            fees: 0.0,
            broker_order_id: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn request(&self) -> &OrderRequest {
        &self.request
    }

    pub fn symbol(&self) -> &str {
        &self.request.symbol
    }

    pub fn origin(&self) -> OrderOrigin {
        self.request.origin
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn quantity(&self) -> f64 {
        self.request.quantity
    }

    pub fn filled_quantity(&self) -> f64 {
        self.filled_quantity
    }

    pub fn remaining_quantity(&self) -> f64 {
        (self.request.quantity - self.filled_quantity).max(0.0)
    }

    pub fn average_fill_price(&self) -> f64 {
        self.average_fill_price
    }

    pub fn fees(&self) -> f64 {
        self.fees
    }

    pub fn broker_order_id(&self) -> Option<&str> {
        self.broker_order_id.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the order along the lifecycle table, refusing anything else.
    pub fn transition(&mut self, next: OrderState, message: Option<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TradingError::transition(self.state, next));
        }
        debug!("Order {} {} -> {}", self.id, self.state, next);
        self.state = next;
        if message.is_some() {
            self.message = message;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_broker_order_id(&mut self, broker_order_id: impl Into<String>) {
        self.broker_order_id = Some(broker_order_id.into());
        self.updated_at = Utc::now();
    }

    /// Adds an incremental fill to the cumulative totals.
    pub fn record_fill(&mut self, quantity: f64, price: f64, fees: f64) {
        let total = self.filled_quantity + quantity;
        if total > 0.0 {
            self.average_fill_price =
                (self.average_fill_price * self.filled_quantity + price * quantity) / total;
        }
        self.filled_quantity = total;
        self.fees += fees;
        self.updated_at = Utc::now();
    }

    /// Replaces the order's terms. Only PENDING and SUBMITTED orders can be amended, and
    /// symbol, side and origin cannot change.
    pub fn amend(&mut self, request: OrderRequest) -> Result<()> {
        if !self.state.is_amendable() {
            return Err(TradingError::validation(format!(
                "order {} cannot be modified in state {}",
                self.id, self.state
            )));
        }
        if request.symbol != self.request.symbol
            || request.side != self.request.side
            || request.origin != self.request.origin
        {
            return Err(TradingError::validation(
                "symbol, side and origin of an order cannot be modified",
            ));
        }
        self.request = OrderRequest {
            signal_id: self.request.signal_id,
            ..request
        };
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Entity for Order {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn owner(&self) -> Option<String> {
        Some(self.request.origin.to_string())
    }
}
