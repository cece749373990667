//! # System Orchestrator
//!
//! Builds every service once at startup and wires them together:
//!
//! ```text
//! strategy runtime -> RiskRouter (risk gate) -> execution pipeline -> portfolio state
//!                                                      ^                    |
//!                                                      +---- rebalancer <---+
//! ```
//!
//! [`system::TradingSystem`] is the only object a presentation layer needs. Background
//! loops (marks and snapshots, fill listener, auto-rebalance) live in [`monitor`] and
//! report on the [`event_bus::EventBus`]. [`backtest::Backtester`] replays recorded
//! snapshots through the same strategy and risk code on a private paper book.

pub mod backtest;
pub mod config;
pub mod event_bus;
pub mod monitor;
pub mod rebalance;
pub mod router;
pub mod system;

pub use backtest::{BacktestConfig, BacktestReport, BacktestTrade, Backtester, EquityPoint};
pub use config::{AppConfig, LoggingConfig, SystemConfig};
pub use event_bus::{EventBus, SystemError, SystemEvent};
pub use rebalance::{RebalanceDriver, RebalanceOutcome};
pub use router::RiskRouter;
pub use system::{HealthReport, HealthStatus, PortfolioSummary, SystemBuilder, SystemStatus, TradingSystem};
