//! Position sizing policies. Each returns the fraction of portfolio value to commit.

mod fixed;
mod kelly;
mod sharpe;

pub use fixed::FixedFraction;
pub use kelly::Kelly;
pub use sharpe::SharpeOptimal;

use crate::config::{PositionSizing, RiskConfig};

/// What a sizing policy may look at.
#[derive(Debug, Clone, Default)]
pub struct SizingInputs {
    pub price: f64,
    pub portfolio_value: f64,
    pub strength: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Annualised volatility of the symbol, when known.
    pub volatility: Option<f64>,
    pub expected_return: Option<f64>,
}

pub trait SizingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fraction of portfolio value in `[0, max_position_size]`.
    fn fraction(&self, inputs: &SizingInputs) -> f64;
}

pub fn policy_for(config: &RiskConfig) -> Box<dyn SizingPolicy> {
    match config.position_sizing {
        PositionSizing::Kelly => Box::new(Kelly {
            max_fraction: config.max_position_size,
            fallback_fraction: config.fallback_fraction,
        }),
        PositionSizing::SharpeOptimal => Box::new(SharpeOptimal {
            max_fraction: config.max_position_size,
            fallback_fraction: config.fallback_fraction,
            risk_free_rate: config.risk_free_rate,
            default_expected_return: config.default_expected_return,
        }),
        PositionSizing::FixedFraction => Box::new(FixedFraction {
            fraction: config.position_fraction,
            max_fraction: config.max_position_size,
        }),
    }
}

/// Whole units for `fraction` of `portfolio_value`, scaled by signal strength and
/// clamped to `[0, floor(max_fraction × portfolio_value / price)]`.
pub fn quantity(fraction: f64, inputs: &SizingInputs, max_fraction: f64) -> f64 {
    if !(inputs.price.is_finite() && inputs.price > 0.0) || inputs.portfolio_value <= 0.0 {
        return 0.0;
    }
    let bound = (max_fraction * inputs.portfolio_value / inputs.price).floor().max(0.0);
    let base = (fraction.max(0.0) * inputs.portfolio_value / inputs.price).floor();
    let strength = if inputs.strength.is_finite() { inputs.strength.clamp(0.0, 1.0) } else { 0.0 };
    (base * strength).floor().clamp(0.0, bound)
}
