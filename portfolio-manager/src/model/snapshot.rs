use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trading::{Entity, Position};

/// A position as seen in a snapshot, with its valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub position: Position,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    /// Share of total portfolio value (cash included).
    pub weight: f64,
}

/// Aggregate risk figures over the current position set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Parametric one-day VaR in currency.
    pub value_at_risk: f64,
    /// VaR as a fraction of total value.
    pub var_pct: f64,
    pub expected_shortfall: f64,
    /// Normalised Herfindahl index of position weights, in `[0, 1]`.
    pub concentration: f64,
    pub largest_weight: f64,
    pub sector_exposure: HashMap<String, f64>,
    /// Annualised volatility of the invested book.
    pub portfolio_volatility: f64,
    pub portfolio_beta: f64,
    /// Fractional decline from the high-water mark.
    pub drawdown: f64,
}

/// Point-in-time read of the portfolio. `total_value == cash + Σ market_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
    pub cash: f64,
    pub positions: Vec<PositionView>,
    pub risk: RiskMetrics,
    pub high_water_mark: f64,
    /// Number of fills applied to the book when this snapshot was taken.
    pub fill_count: u64,
}

impl PortfolioSnapshot {
    pub fn position(&self, symbol: &str) -> Option<&PositionView> {
        self.positions.iter().find(|p| p.position.symbol == symbol)
    }

    pub fn weight(&self, symbol: &str) -> f64 {
        self.position(symbol).map(|p| p.weight).unwrap_or(0.0)
    }

    pub fn invested_value(&self) -> f64 {
        self.positions.iter().map(|p| p.market_value).sum()
    }

    pub fn weights(&self) -> HashMap<String, f64> {
        self.positions
            .iter()
            .map(|p| (p.position.symbol.clone(), p.weight))
            .collect()
    }
}

impl Entity for PortfolioSnapshot {
    fn entity_id(&self) -> String {
        format!("snapshot-{}", self.timestamp.timestamp_nanos_opt().unwrap_or_default())
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Outcomes of closed (or partially closed) trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub wins: u64,
    pub losses: u64,
    /// Sum of winning returns (fractions of entry price).
    pub gross_win: f64,
    /// Sum of losing returns as positive fractions.
    pub gross_loss: f64,
}

impl TradeStats {
    pub fn record(&mut self, trade_return: f64) {
        if trade_return > 0.0 {
            self.wins += 1;
            self.gross_win += trade_return;
        } else {
            self.losses += 1;
            self.gross_loss += -trade_return;
        }
    }

    pub fn trades(&self) -> u64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        let n = self.trades();
        (n > 0).then(|| self.wins as f64 / n as f64)
    }

    pub fn average_win(&self) -> Option<f64> {
        (self.wins > 0).then(|| self.gross_win / self.wins as f64)
    }

    pub fn average_loss(&self) -> Option<f64> {
        (self.losses > 0).then(|| self.gross_loss / self.losses as f64)
    }
}

/// Performance of the book since inception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_value: f64,
    pub current_value: f64,
    pub total_return: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub fees_paid: f64,
    pub high_water_mark: f64,
    pub drawdown: f64,
    pub max_drawdown: f64,
    pub trades: TradeStats,
}
