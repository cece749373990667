use super::identity::{ExecutionId, SignalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

/// A strategy's proposed trade before sizing and risk checks.
///
/// Signals are short-lived: the runtime hands each one to the risk gate exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub execution_id: Option<ExecutionId>,
    pub symbol: String,
    pub direction: Direction,
    /// Conviction in `[0, 1]`, scales the sized quantity.
    pub strength: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Reference price the signal was generated at.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub rationale: String,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SignalId::new(),
            execution_id: None,
            symbol: symbol.into(),
            direction,
            strength: 1.0,
            confidence: 1.0,
            price,
            timestamp,
            rationale: String::new(),
        }
    }

    pub fn buy(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(symbol, Direction::Buy, price, timestamp)
    }

    pub fn sell(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(symbol, Direction::Sell, price, timestamp)
    }

    /// Sets the strength, clamped to `[0, 1]`. NaN collapses to 0.
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = clamp_unit(strength);
        self
    }

    /// Sets the confidence, clamped to `[0, 1]`. NaN collapses to 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Hold
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl crate::traits::repository::Entity for Signal {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn owner(&self) -> Option<String> {
        self.execution_id.map(|id| id.to_string())
    }
}
