use crate::models::Order;
use crate::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use trading::{OrderId, OrderOrigin, OrderRequest, OrderState, Result, TradingError};

/// Order counts by lifecycle stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Admitted but not yet taken by the worker.
    pub queued: usize,
    /// Accepted by the broker and not yet terminal.
    pub working: usize,
    pub total: usize,
    pub by_state: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub symbol: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, symbol: &str, at: DateTime<Utc>) -> bool {
        self.symbol.as_deref().map_or(true, |s| s == symbol)
            && self.from.map_or(true, |from| at >= from)
            && self.to.map_or(true, |to| at <= to)
    }
}

/// Every order the pipeline has admitted, keyed by id.
pub struct OrderBook {
    orders: HashMap<OrderId, Order>,
    sequence: u64,
    unresolved: HashMap<(OrderOrigin, String), OrderId>,
    allow_concurrent: bool,
}

impl OrderBook {
    pub fn new(allow_concurrent: bool) -> Self {
        Self {
            orders: HashMap::new(),
            sequence: 0,
            unresolved: HashMap::new(),
            allow_concurrent,
        }
    }

    /// Validates and records a new PENDING order, assigning the next sequence number.
    pub fn admit(&mut self, request: OrderRequest) -> Result<OrderId> {
        validation::validate(&request)?;

        let key = (request.origin, request.symbol.clone());
        if !self.allow_concurrent {
            if let Some(existing) = self.unresolved.get(&key) {
                return Err(TradingError::validation(format!(
                    "{} already has unresolved order {} for {}",
                    request.origin, existing, request.symbol
                )));
            }
        }

        self.sequence += 1;
        let id = OrderId::new();
        let order = Order::new(id, request, self.sequence);
        self.unresolved.insert(key, id);
        self.orders.insert(id, order);
        Ok(id)
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Applies `f` to an order and releases its (origin, symbol) slot once it is terminal.
    pub fn update<T>(&mut self, id: &OrderId, f: impl FnOnce(&mut Order) -> Result<T>) -> Result<T> {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))?;
        let out = f(order)?;
        if order.is_terminal() {
            let key = (order.origin(), order.symbol().to_string());
            if self.unresolved.get(&key) == Some(id) {
                self.unresolved.remove(&key);
            }
        }
        Ok(out)
    }

    pub fn transition(&mut self, id: &OrderId, next: OrderState, message: Option<String>) -> Result<Order> {
        self.update(id, |order| {
            order.transition(next, message)?;
            Ok(order.clone())
        })
    }

    /// Orders in the given state, in admission order.
    pub fn by_state(&self, state: OrderState) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().filter(|o| o.state() == state).cloned().collect();
        orders.sort_by_key(Order::sequence);
        orders
    }

    /// Orders accepted by the broker that have not reached a terminal state.
    pub fn working(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| {
                matches!(o.state(), OrderState::Submitted | OrderState::PartiallyFilled)
                    && o.broker_order_id().is_some()
            })
            .cloned()
            .collect();
        orders.sort_by_key(Order::sequence);
        orders
    }

    /// All orders in admission order, filtered by symbol and creation time.
    pub fn history(&self, filter: &HistoryFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| filter.matches(o.symbol(), o.created_at()))
            .cloned()
            .collect();
        orders.sort_by_key(Order::sequence);
        if let Some(limit) = filter.limit {
            let skip = orders.len().saturating_sub(limit);
            orders.drain(..skip);
        }
        orders
    }

    pub fn status(&self) -> QueueStatus {
        let mut status = QueueStatus {
            total: self.orders.len(),
            ..Default::default()
        };
        for order in self.orders.values() {
            *status.by_state.entry(order.state().to_string()).or_insert(0) += 1;
            match order.state() {
                OrderState::Pending => status.queued += 1,
                OrderState::Submitted | OrderState::PartiallyFilled => status.working += 1,
                _ => {}
            }
        }
        status
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
