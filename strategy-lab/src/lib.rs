//! # Strategy Lab
//!
//! Built-in strategies and the indicators they are computed from.
//!
//! Strategies are registered at compile time through [`register_builtin`]; there is no
//! dynamic loading.

pub mod indicators;
pub mod mean_reversion;
pub mod momentum;

use trading_core::framework::StrategyRegistry;

pub use mean_reversion::MeanReversion;
pub use momentum::Momentum;

/// Registers every built-in strategy definition.
pub fn register_builtin(registry: &StrategyRegistry) {
    registry.register(momentum::definition());
    registry.register(mean_reversion::definition());
}

#[cfg(test)]
mod tests;
