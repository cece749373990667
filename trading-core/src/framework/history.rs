//! Rolling price history kept by each execution.
//!
//! Feeds the volatility and ATR inputs the risk gate needs for sizing and stop placement.

use std::collections::{HashMap, VecDeque};
use trading::MarketSnapshot;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const ATR_PERIOD: usize = 14;

/// Statistics derived from recent prices of one symbol. `None` means not enough data.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SymbolStats {
    /// Annualised standard deviation of simple returns.
    pub volatility: Option<f64>,
    /// Average absolute close-to-close move over the last 14 observations.
    pub atr: Option<f64>,
    /// Annualised mean of simple returns.
    pub expected_return: Option<f64>,
}

/// Per-symbol rolling window of observed prices.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    prices: HashMap<String, VecDeque<f64>>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            prices: HashMap::new(),
        }
    }

    pub fn record(&mut self, snapshot: &MarketSnapshot) {
        for (symbol, quote) in snapshot.iter() {
            if !quote.price.is_finite() || quote.price <= 0.0 {
                continue;
            }
            let series = self.prices.entry(symbol.clone()).or_default();
            series.push_back(quote.price);
            while series.len() > self.capacity {
                series.pop_front();
            }
        }
    }

    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.prices
            .get(symbol)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.prices.get(symbol).map(|s| s.len()).unwrap_or(0)
    }

    pub fn stats(&self, symbol: &str) -> SymbolStats {
        let Some(series) = self.prices.get(symbol) else {
            return SymbolStats::default();
        };
        let prices: Vec<f64> = series.iter().copied().collect();
        let returns: Vec<f64> = prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect();

        let (volatility, expected_return) = if returns.len() >= 2 {
            let n = returns.len() as f64;
            let mean = returns.iter().sum::<f64>() / n;
            let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (
                Some(var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()),
                Some(mean * TRADING_DAYS_PER_YEAR),
            )
        } else {
            (None, None)
        };

        let atr = if prices.len() > ATR_PERIOD {
            let moves: Vec<f64> = prices
                .windows(2)
                .rev()
                .take(ATR_PERIOD)
                .map(|w| (w[1] - w[0]).abs())
                .collect();
            Some(moves.iter().sum::<f64>() / moves.len() as f64)
        } else {
            None
        };

        SymbolStats {
            volatility,
            atr,
            expected_return,
        }
    }
}
