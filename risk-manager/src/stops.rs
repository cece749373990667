use crate::config::RiskConfig;
use serde::{Deserialize, Serialize};
use trading::Side;

/// Protective exit levels for a new position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl StopLevels {
    /// ATR-based stop when an ATR is known, volatility-based otherwise, never further from
    /// entry than `stop_loss_pct`. Take-profit is the stop distance times the risk:reward
    /// ratio, capped at `take_profit_pct`.
    ///
    /// Levels for a sell mirror those of a buy around the entry price.
    pub fn compute(config: &RiskConfig, side: Side, entry: f64, atr: Option<f64>, volatility: Option<f64>) -> Self {
        let distance = match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(atr) => atr * config.atr_multiplier,
            None => {
                let vol = volatility
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .unwrap_or(config.default_volatility);
                entry * vol * config.atr_multiplier
            }
        };
        let distance = distance.min(entry * config.stop_loss_pct);
        let reward = (distance * config.risk_reward_ratio).min(entry * config.take_profit_pct);

        match side {
            Side::Buy => Self {
                stop_loss: entry - distance,
                take_profit: entry + reward,
            },
            Side::Sell => Self {
                stop_loss: entry + distance,
                take_profit: entry - reward,
            },
        }
    }

    /// Loss per unit if the stop is hit.
    pub fn risk_per_unit(&self, entry: f64) -> f64 {
        (entry - self.stop_loss).abs()
    }
}
