use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Commission charged on every fill, as a fraction of notional.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    /// Opening prices of the simulated market. Orders for other symbols are rejected.
    #[serde(default)]
    pub initial_prices: HashMap<String, f64>,
    /// Maximum relative move per simulator step.
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    /// Interval between simulator steps when the market clock runs.
    #[serde(default = "default_clock_interval_ms")]
    pub clock_interval_ms: u64,
    /// Fixes the random walk for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_fee_rate() -> f64 {
    0.001
}

fn default_volatility() -> f64 {
    0.01
}

fn default_clock_interval_ms() -> u64 {
    1_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            initial_prices: HashMap::new(),
            volatility: default_volatility(),
            clock_interval_ms: default_clock_interval_ms(),
            seed: None,
        }
    }
}

impl BrokerConfig {
    pub fn with_price(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.initial_prices.insert(symbol.into(), price);
        self
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms.max(1))
    }
}
