//! The strategy runtime.
//!
//! A [`registry::StrategyRegistry`] holds the compile-time set of strategy definitions.
//! The [`runner_manager::ExecutionManager`] instantiates them into independent
//! [`runner::ExecutionRunner`] tasks, each owning one [`context::ExecutionContext`]
//! and forwarding its signals to a [`sink::SignalSink`]. [`replay::ReplayRunner`] runs
//! the same hooks over recorded snapshots on a simulated clock.

pub mod context;
pub mod history;
pub mod parameters;
pub mod registry;
pub mod replay;
pub mod runner;
pub mod runner_manager;
pub mod sink;
pub mod strategy;

pub use context::ExecutionContext;
pub use history::{PriceHistory, SymbolStats};
pub use parameters::{ParameterSchema, ParameterSpec, ParameterValue, Parameters};
pub use registry::StrategyRegistry;
pub use replay::ReplayRunner;
pub use runner::{ExecutionRunner, RuntimeConfig};
pub use runner_manager::{ExecutionManager, ExecutionRequest, ExecutionStatus};
pub use sink::{Routing, SignalEnvelope, SignalSink};
pub use strategy::{Strategy, StrategyDefinition, StrategyInfo};

#[cfg(test)]
mod tests;
