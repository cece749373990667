//! Order execution pipeline.
//!
//! Every order intent, whatever its origin, is admitted into one [`book::OrderBook`] and
//! queued on one FIFO channel drained by exactly one worker. The worker is the only code
//! that talks to the broker to submit orders and the only writer of portfolio state.

pub mod book;
pub mod engine;
pub mod models;
pub mod validation;

pub use book::{HistoryFilter, OrderBook, QueueStatus};
pub use engine::{ExecutionPipeline, PipelineEvent};
pub use models::{ExecutionConfig, ExecutionLedger, LedgerEntry, LedgerRecord, Order, Transaction};
