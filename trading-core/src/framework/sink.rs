use crate::framework::context::ExecutionContext;
use crate::framework::history::SymbolStats;
use async_trait::async_trait;
use trading::{OrderId, Result, Signal};

/// A signal on its way to the risk gate, with the inputs gathered by the runtime.
#[derive(Debug, Clone)]
pub struct SignalEnvelope {
    pub signal: Signal,
    /// Quantity suggested by the strategy's `size_position` hook.
    pub suggested_quantity: Option<f64>,
    pub stats: SymbolStats,
}

/// What happened to a routed signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// An order was enqueued on the execution pipeline.
    Submitted(OrderId),
    /// The risk gate sized the signal to zero or rejected it.
    Declined(String),
}

/// Downstream of the strategy runtime.
///
/// The runner awaits each call before routing the next signal, which preserves the
/// generation order of one execution's signals.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn route(&self, ctx: &ExecutionContext, envelope: SignalEnvelope) -> Result<Routing>;
}
