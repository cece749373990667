use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use trading::{MarketSnapshot, Quote};

const MIN_PRICE: f64 = 0.01;

/// Independent random walk per symbol: each step moves a price by a uniform relative
/// change in `[-volatility, volatility)`.
pub struct RandomWalk {
    prices: BTreeMap<String, f64>,
    volatility: f64,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(prices: impl IntoIterator<Item = (String, f64)>, volatility: f64, seed: Option<u64>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .filter(|(_, p)| p.is_finite() && *p > 0.0)
                .collect(),
            volatility: volatility.abs(),
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    pub fn step(&mut self) {
        for price in self.prices.values_mut() {
            let change = if self.volatility > 0.0 {
                self.rng.gen_range(-self.volatility..self.volatility)
            } else {
                0.0
            };
            *price = (*price * (1.0 + change)).max(MIN_PRICE);
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn set_price(&mut self, symbol: impl Into<String>, price: f64) {
        self.prices.insert(symbol.into(), price.max(MIN_PRICE));
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.prices.keys()
    }

    /// Quotes for the requested symbols; unknown ones are left out.
    pub fn quote(&mut self, symbols: &[String]) -> MarketSnapshot {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::new(now);
        for symbol in symbols {
            if let Some(price) = self.prices.get(symbol) {
                let volume = self.rng.gen_range(1_000.0..10_000.0_f64).round();
                snapshot.insert(symbol.clone(), Quote::new(*price, volume, now));
            }
        }
        snapshot
    }
}
