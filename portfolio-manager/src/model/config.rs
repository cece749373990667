use crate::rebalancer::RebalanceFrequency;
use crate::weighting::Optimization;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration of the portfolio book and the rebalancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    /// Absolute weight deviation that triggers a rebalance.
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: f64,
    #[serde(default)]
    pub rebalance_frequency: RebalanceFrequency,
    /// Upper bound on any single post-trade weight.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_max_sector_exposure")]
    pub max_sector_exposure: f64,
    /// Fraction of total value kept in cash when computing targets.
    #[serde(default = "default_cash_buffer")]
    pub cash_buffer: f64,
    #[serde(default)]
    pub optimization: Optimization,
    #[serde(default = "default_true")]
    pub auto_rebalance: bool,
    /// Maximum number of snapshots kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Prices kept per symbol for volatility, beta and covariance estimates.
    #[serde(default = "default_mark_history")]
    pub mark_history: usize,
    /// Symbol to sector mapping used for sector exposure.
    #[serde(default)]
    pub sectors: HashMap<String, String>,
    /// Explicit target weights. When empty, targets come from `optimization` over `universe`.
    #[serde(default)]
    pub target_weights: HashMap<String, f64>,
    #[serde(default)]
    pub universe: Vec<String>,
    /// Symbol used as the market for beta estimates.
    #[serde(default)]
    pub benchmark: Option<String>,
    /// Fee rate used to estimate the cost of rebalancing trades.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Confidence of the VaR figure reported in snapshots.
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
}

fn default_initial_cash() -> f64 {
    1_000_000.0
}

fn default_rebalance_threshold() -> f64 {
    0.05
}

fn default_max_position_size() -> f64 {
    0.1
}

fn default_max_sector_exposure() -> f64 {
    0.3
}

fn default_cash_buffer() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    1000
}

fn default_mark_history() -> usize {
    252
}

fn default_fee_rate() -> f64 {
    0.001
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_var_confidence() -> f64 {
    0.95
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            rebalance_threshold: default_rebalance_threshold(),
            rebalance_frequency: RebalanceFrequency::default(),
            max_position_size: default_max_position_size(),
            max_sector_exposure: default_max_sector_exposure(),
            cash_buffer: default_cash_buffer(),
            optimization: Optimization::default(),
            auto_rebalance: true,
            history_limit: default_history_limit(),
            mark_history: default_mark_history(),
            sectors: HashMap::new(),
            target_weights: HashMap::new(),
            universe: Vec::new(),
            benchmark: None,
            fee_rate: default_fee_rate(),
            risk_free_rate: default_risk_free_rate(),
            var_confidence: default_var_confidence(),
        }
    }
}

impl PortfolioConfig {
    pub fn with_initial_cash(mut self, cash: f64) -> Self {
        self.initial_cash = cash;
        self
    }

    pub fn with_target(mut self, symbol: impl Into<String>, weight: f64) -> Self {
        self.target_weights.insert(symbol.into(), weight);
        self
    }

    pub fn with_sector(mut self, symbol: impl Into<String>, sector: impl Into<String>) -> Self {
        self.sectors.insert(symbol.into(), sector.into());
        self
    }
}
