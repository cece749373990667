use super::order::Order;
use tokio::sync::oneshot;
use trading::{MarketSnapshot, OrderId, OrderRequest, Result};

/// Messages drained by the pipeline worker, strictly in arrival order.
#[derive(Debug)]
pub enum Ingress {
    /// A freshly admitted order, already in the book as PENDING.
    Order(OrderId),
    /// Marks to apply to portfolio state.
    Mark(MarketSnapshot),
    /// Cancel a working order at the broker.
    Cancel {
        id: OrderId,
        reply: oneshot::Sender<Result<Order>>,
    },
    /// Amend a working order at the broker.
    Modify {
        id: OrderId,
        request: OrderRequest,
        reply: oneshot::Sender<Result<Order>>,
    },
    Shutdown,
}
