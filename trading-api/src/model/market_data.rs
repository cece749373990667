use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }
}

/// Point-in-time quotes keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    quotes: HashMap<String, Quote>,
}

impl MarketSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            quotes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, quote: Quote) {
        self.quotes.insert(symbol.into(), quote);
    }

    pub fn with_quote(mut self, symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        let quote = Quote::new(price, volume, self.timestamp);
        self.insert(symbol, quote);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.quotes.get(symbol).map(|q| q.price)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Quote)> {
        self.quotes.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.quotes.keys()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
