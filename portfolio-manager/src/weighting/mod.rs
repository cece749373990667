//! Target-weight schemes used by the rebalancer.

mod equal;
mod optimizer;
mod risk_parity;

pub use equal::EqualWeight;
pub use optimizer::{MaxSharpe, MinVariance};
pub use risk_parity::RiskParity;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trading::model::position::DEFAULT_VOLATILITY;

/// Market inputs a weighting scheme may draw on.
#[derive(Debug, Clone, Default)]
pub struct WeightingInputs {
    pub symbols: Vec<String>,
    /// Annualised volatility per symbol.
    pub volatilities: HashMap<String, f64>,
    /// Simple per-period returns per symbol, oldest first.
    pub returns: HashMap<String, Vec<f64>>,
    pub max_weight: f64,
    pub risk_free_rate: f64,
}

impl WeightingInputs {
    pub fn new(symbols: Vec<String>, max_weight: f64) -> Self {
        Self {
            symbols,
            max_weight,
            ..Default::default()
        }
    }

    pub fn with_volatility(mut self, symbol: impl Into<String>, volatility: f64) -> Self {
        self.volatilities.insert(symbol.into(), volatility);
        self
    }

    pub fn with_returns(mut self, symbol: impl Into<String>, returns: Vec<f64>) -> Self {
        self.returns.insert(symbol.into(), returns);
        self
    }

    pub fn volatility(&self, symbol: &str) -> f64 {
        self.volatilities
            .get(symbol)
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_VOLATILITY)
    }
}

/// Produces target weights summing to at most one.
pub trait WeightingScheme: Send + Sync {
    fn name(&self) -> &'static str;

    fn weights(&self, inputs: &WeightingInputs) -> HashMap<String, f64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimization {
    EqualWeight,
    #[default]
    RiskParity,
    MinVariance,
    MaxSharpe,
}

impl Optimization {
    pub fn scheme(&self) -> Box<dyn WeightingScheme> {
        match self {
            Optimization::EqualWeight => Box::new(EqualWeight),
            Optimization::RiskParity => Box::new(RiskParity),
            Optimization::MinVariance => Box::new(MinVariance::default()),
            Optimization::MaxSharpe => Box::new(MaxSharpe::default()),
        }
    }
}

/// Scales raw non-negative scores to sum to one, then caps each at `cap` and
/// redistributes the excess over the uncapped names until nothing is above the cap.
///
/// When `cap × n < 1` no feasible allocation sums to one; every weight is set to `cap`
/// and the remainder stays in cash.
pub(crate) fn normalize_capped(scores: &[(String, f64)], cap: f64) -> HashMap<String, f64> {
    let n = scores.len();
    if n == 0 {
        return HashMap::new();
    }
    let cap = if cap > 0.0 { cap.min(1.0) } else { 1.0 };
    if cap * (n as f64) < 1.0 {
        return scores.iter().map(|(s, _)| (s.clone(), cap)).collect();
    }

    let mut fixed: HashMap<String, f64> = HashMap::new();
    loop {
        let remaining = 1.0 - fixed.values().sum::<f64>();
        let free: Vec<&(String, f64)> = scores.iter().filter(|(s, _)| !fixed.contains_key(s)).collect();
        let total: f64 = free.iter().map(|(_, v)| *v).sum();
        if free.is_empty() {
            return fixed;
        }

        let mut weights: HashMap<String, f64> = free
            .iter()
            .map(|(s, v)| {
                let w = if total > 0.0 { v / total } else { 1.0 / free.len() as f64 };
                (s.clone(), w * remaining)
            })
            .collect();

        let over: Vec<String> = weights
            .iter()
            .filter(|(_, w)| **w > cap + 1e-12)
            .map(|(s, _)| s.clone())
            .collect();
        if over.is_empty() {
            weights.extend(fixed);
            return weights;
        }
        for s in over {
            fixed.insert(s, cap);
        }
    }
}
