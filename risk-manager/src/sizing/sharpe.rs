use super::{SizingInputs, SizingPolicy};

/// Volatility-scaled Sharpe sizing: `f = ((er − rf) / σ) / (2σ)`.
#[derive(Debug, Clone)]
pub struct SharpeOptimal {
    pub max_fraction: f64,
    pub fallback_fraction: f64,
    pub risk_free_rate: f64,
    pub default_expected_return: f64,
}

impl SizingPolicy for SharpeOptimal {
    fn name(&self) -> &'static str {
        "sharpe_optimal"
    }

    fn fraction(&self, inputs: &SizingInputs) -> f64 {
        let Some(vol) = inputs.volatility.filter(|v| v.is_finite() && *v > 0.0) else {
            return self.fallback_fraction.clamp(0.0, self.max_fraction);
        };
        let er = inputs
            .expected_return
            .filter(|r| r.is_finite())
            .unwrap_or(self.default_expected_return);
        let sharpe = (er - self.risk_free_rate) / vol;
        (sharpe / (2.0 * vol)).min(self.max_fraction).max(0.0)
    }
}
