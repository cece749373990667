use super::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default annualised volatility assumed until enough marks have been observed.
pub const DEFAULT_VOLATILITY: f64 = 0.2;

/// A holding in one symbol.
///
/// Created on the first fill, updated on each subsequent fill and removed by the
/// owner of the book once `quantity` returns to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub average_entry_price: f64,
    /// Latest mark used for valuation.
    pub last_price: f64,
    pub realized_pnl: f64,
    /// Annualised volatility of the symbol's returns.
    pub volatility: f64,
    pub beta: f64,
    pub sector: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, price: f64, opened_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            average_entry_price: 0.0,
            last_price: price,
            realized_pnl: 0.0,
            volatility: DEFAULT_VOLATILITY,
            beta: 1.0,
            sector: None,
            opened_at,
            updated_at: opened_at,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_entry_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }

    /// Unrealised return relative to the entry price, `0.0` for a flat position.
    pub fn unrealized_return(&self) -> f64 {
        if self.average_entry_price <= 0.0 {
            return 0.0;
        }
        self.last_price / self.average_entry_price - 1.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < 1e-9
    }

    /// Applies a fill and returns the realised P&L it produced.
    ///
    /// Buys move the average entry price; sells realise P&L against it and leave it unchanged.
    pub fn apply_fill(&mut self, side: Side, quantity: f64, price: f64, at: DateTime<Utc>) -> f64 {
        let realized = match side {
            Side::Buy => {
                let total_cost = self.cost_basis() + quantity * price;
                self.quantity += quantity;
                if self.quantity > 0.0 {
                    self.average_entry_price = total_cost / self.quantity;
                }
                0.0
            }
            Side::Sell => {
                let closed = quantity.min(self.quantity.max(0.0));
                self.quantity -= quantity;
                (price - self.average_entry_price) * closed
            }
        };
        self.realized_pnl += realized;
        self.updated_at = at;
        realized
    }
}
