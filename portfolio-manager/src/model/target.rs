use serde::{Deserialize, Serialize};
use std::fmt;
use trading::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceAction {
    Sell,
    Buy,
    Hold,
}

impl RebalanceAction {
    pub fn side(&self) -> Option<Side> {
        match self {
            RebalanceAction::Buy => Some(Side::Buy),
            RebalanceAction::Sell => Some(Side::Sell),
            RebalanceAction::Hold => None,
        }
    }
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceAction::Buy => write!(f, "BUY"),
            RebalanceAction::Sell => write!(f, "SELL"),
            RebalanceAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// One symbol's move from its current weight to its target weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingTarget {
    pub symbol: String,
    pub target_weight: f64,
    pub current_weight: f64,
    /// `target_weight - current_weight`.
    pub deviation: f64,
    pub action: RebalanceAction,
    /// Whole units to trade, always non-negative. The direction is in `action`.
    pub quantity_delta: f64,
    pub price: f64,
    pub estimated_cost: f64,
}

impl RebalancingTarget {
    pub fn notional(&self) -> f64 {
        self.quantity_delta * self.price
    }
}
