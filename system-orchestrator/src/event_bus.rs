//! # Event Bus
//!
//! Everything the orchestrator observes is republished here: execution lifecycle, order
//! updates from the pipeline, risk alerts and completed rebalances.
//!
//! Engines never hold a reference back to the orchestrator. They expose their own
//! channels (the pipeline's [`PipelineEvent`] stream, the gate's alert set) and the
//! orchestrator's background loops forward what they see onto this bus.

use execution_engine::PipelineEvent;
use portfolio_manager::RebalanceReason;
use risk_manager::RiskAlert;
use serde::Serialize;
use tokio::sync::broadcast;
use trading::{ExecutionId, ExecutionState};

/// A state change worth telling subscribers about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    /// **Runtime**: an execution task was spawned.
    ExecutionStarted {
        id: ExecutionId,
        strategy: String,
        owner: String,
    },

    /// **Runtime**: an execution task ended.
    ExecutionStopped { id: ExecutionId, state: ExecutionState },

    /// **Pipeline**: an order changed state or produced a fill.
    Order { event: PipelineEvent },

    /// **Risk**: a limit breach was observed for the first time.
    RiskAlert { alert: RiskAlert },

    /// **Rebalancer**: a rebalance submitted its orders.
    RebalanceCompleted {
        orders: usize,
        reason: Option<RebalanceReason>,
    },

    /// **System**: a non-fatal problem in a background loop.
    Error { error: SystemError },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SystemError {
    /// Broker or market data unreachable.
    Connectivity(String),
    /// State files could not be written.
    Persistence(String),
    /// Unexpected logic errors.
    Fatal(String),
}

impl SystemError {
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

/// A wrapper around a tokio broadcast channel enforcing the event type.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a new EventBus.
    ///
    /// See [`tokio::sync::broadcast::channel`] for details.
    pub fn new() -> Self {
        // Slow subscribers skip the oldest events (Lagged) rather than blocking publishers.
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    pub fn publish(&self, event: SystemEvent) {
        // No subscribers is fine (e.g., during startup)
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber.
    ///
    /// See [`tokio::sync::broadcast::Sender::subscribe`] for details.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }
}
