use super::{normalize_capped, WeightingInputs, WeightingScheme};
use std::collections::HashMap;

/// Inverse-volatility weights, capped at the maximum position size and renormalised.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskParity;

impl WeightingScheme for RiskParity {
    fn name(&self) -> &'static str {
        "risk_parity"
    }

    fn weights(&self, inputs: &WeightingInputs) -> HashMap<String, f64> {
        let scores: Vec<(String, f64)> = inputs
            .symbols
            .iter()
            .map(|s| (s.clone(), 1.0 / inputs.volatility(s)))
            .collect();
        normalize_capped(&scores, inputs.max_weight)
    }
}
