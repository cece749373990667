//! Portfolio state and rebalancing.
//!
//! [`state::PortfolioState`] is the single book of positions and cash. It is written only
//! by the execution pipeline worker (fills and marks) and read concurrently by everyone else.
//! [`rebalancer::Rebalancer`] compares the book against target weights and plans the
//! orders that bring it back in line; those orders go through the execution pipeline
//! like any other.

pub mod metrics;
pub mod model;
pub mod rebalancer;
pub mod state;
pub mod weighting;

pub use model::config::PortfolioConfig;
pub use model::snapshot::{PerformanceSummary, PortfolioSnapshot, PositionView, RiskMetrics, TradeStats};
pub use model::target::{RebalanceAction, RebalancingTarget};
pub use rebalancer::{RebalanceCheck, RebalanceFrequency, RebalanceReason, RebalanceState, Rebalancer};
pub use state::PortfolioState;
pub use weighting::{Optimization, WeightingInputs, WeightingScheme};
