use crate::metrics;
use crate::model::config::PortfolioConfig;
use crate::model::snapshot::{PerformanceSummary, PortfolioSnapshot, PositionView, RiskMetrics, TradeStats};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use trading::model::position::DEFAULT_VOLATILITY;
use trading::{Fill, MarketSnapshot, PortfolioView, Position, Result, Side, TradingError};

#[derive(Debug)]
struct PortfolioBook {
    cash: f64,
    positions: BTreeMap<String, Position>,
    marks: HashMap<String, VecDeque<f64>>,
    fees_paid: f64,
    realized_pnl: f64,
    high_water_mark: f64,
    max_drawdown: f64,
    trades: TradeStats,
    fill_count: u64,
    history: VecDeque<PortfolioSnapshot>,
}

impl PortfolioBook {
    fn total_value(&self) -> f64 {
        self.cash + self.positions.values().map(Position::market_value).sum::<f64>()
    }

    fn prices(&self, symbol: &str) -> Vec<f64> {
        self.marks
            .get(symbol)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn volatility(&self, symbol: &str) -> f64 {
        metrics::annualized_volatility(&self.prices(symbol))
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_VOLATILITY)
    }

    fn track_high_water_mark(&mut self) {
        let value = self.total_value();
        if value > self.high_water_mark {
            self.high_water_mark = value;
        }
        self.max_drawdown = self
            .max_drawdown
            .max(metrics::drawdown(value, self.high_water_mark));
    }
}

/// The book of positions and cash.
///
/// Single writer: only the execution pipeline worker calls [`PortfolioState::apply_fill`]
/// and [`PortfolioState::mark_to_market`]. Any number of readers take snapshots concurrently.
pub struct PortfolioState {
    config: PortfolioConfig,
    book: RwLock<PortfolioBook>,
}

impl PortfolioState {
    pub fn new(config: PortfolioConfig) -> Self {
        let book = PortfolioBook {
            cash: config.initial_cash,
            positions: BTreeMap::new(),
            marks: HashMap::new(),
            fees_paid: 0.0,
            realized_pnl: 0.0,
            high_water_mark: config.initial_cash,
            max_drawdown: 0.0,
            trades: TradeStats::default(),
            fill_count: 0,
            history: VecDeque::new(),
        };
        Self {
            config,
            book: RwLock::new(book),
        }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, PortfolioBook> {
        self.book.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PortfolioBook> {
        self.book.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a broker fill to cash and the position together. Returns the realised P&L.
    ///
    /// Fills are facts reported by the broker; only malformed values are refused.
    pub fn apply_fill(&self, fill: &Fill) -> Result<f64> {
        if !(fill.quantity.is_finite() && fill.quantity > 0.0) {
            return Err(TradingError::validation(format!(
                "fill {} has non-positive quantity {}",
                fill.id, fill.quantity
            )));
        }
        if !(fill.price.is_finite() && fill.price > 0.0) {
            return Err(TradingError::validation(format!(
                "fill {} has non-positive price {}",
                fill.id, fill.price
            )));
        }
        if !(fill.fees.is_finite() && fill.fees >= 0.0) {
            return Err(TradingError::validation(format!(
                "fill {} has negative fees {}",
                fill.id, fill.fees
            )));
        }

        let mut book = self.write();
        let volatility = book.volatility(&fill.symbol);
        let sector = self.config.sectors.get(&fill.symbol).cloned();

        let position = book
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| {
                let mut p = Position::new(fill.symbol.clone(), fill.price, fill.timestamp);
                p.sector = sector;
                p.volatility = volatility;
                p
            });
        let entry_price = position.average_entry_price;
        let held = position.quantity;
        let realized = position.apply_fill(fill.side, fill.quantity, fill.price, fill.timestamp);
        position.last_price = fill.price;
        let flat = position.is_flat();

        book.cash += fill.cash_delta();
        book.fees_paid += fill.fees;
        book.realized_pnl += realized;
        book.fill_count += 1;

        if fill.side == Side::Sell && held > 0.0 && entry_price > 0.0 {
            book.trades.record(fill.price / entry_price - 1.0);
        }
        if flat {
            book.positions.remove(&fill.symbol);
            debug!("Position {} closed", fill.symbol);
        }
        book.track_high_water_mark();

        info!(
            "Applied fill {} {} {} @ {:.4} (fees {:.4}); cash {:.2}",
            fill.side, fill.quantity, fill.symbol, fill.price, fill.fees, book.cash
        );
        Ok(realized)
    }

    /// Records marks for every quoted symbol and revalues held positions.
    pub fn mark_to_market(&self, snapshot: &MarketSnapshot) {
        let mut book = self.write();
        let capacity = self.config.mark_history.max(2);
        for (symbol, quote) in snapshot.iter() {
            if !(quote.price.is_finite() && quote.price > 0.0) {
                continue;
            }
            let marks = book.marks.entry(symbol.clone()).or_default();
            marks.push_back(quote.price);
            while marks.len() > capacity {
                marks.pop_front();
            }
        }

        let benchmark = self
            .config
            .benchmark
            .as_ref()
            .map(|b| metrics::returns(&book.prices(b)));
        let symbols: Vec<String> = book.positions.keys().cloned().collect();
        for symbol in symbols {
            let volatility = book.volatility(&symbol);
            let beta = benchmark
                .as_ref()
                .and_then(|market| metrics::beta(&metrics::returns(&book.prices(&symbol)), market));
            let price = snapshot.price(&symbol);
            if let Some(position) = book.positions.get_mut(&symbol) {
                if let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) {
                    position.last_price = price;
                    position.updated_at = snapshot.timestamp;
                }
                position.volatility = volatility;
                if let Some(beta) = beta {
                    position.beta = beta;
                }
            }
        }
        book.track_high_water_mark();
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, timestamp: DateTime<Utc>) -> PortfolioSnapshot {
        let book = self.read();
        self.build_snapshot(&book, timestamp)
    }

    /// Takes a snapshot and appends it to the bounded history.
    pub fn record_snapshot(&self) -> PortfolioSnapshot {
        let mut book = self.write();
        let snapshot = self.build_snapshot(&book, Utc::now());
        book.history.push_back(snapshot.clone());
        while book.history.len() > self.config.history_limit.max(1) {
            book.history.pop_front();
        }
        snapshot
    }

    fn build_snapshot(&self, book: &PortfolioBook, timestamp: DateTime<Utc>) -> PortfolioSnapshot {
        let total_value = book.total_value();
        let positions: Vec<PositionView> = book
            .positions
            .values()
            .map(|p| PositionView {
                position: p.clone(),
                market_value: p.market_value(),
                unrealized_pnl: p.unrealized_pnl(),
                weight: if total_value > 0.0 { p.market_value() / total_value } else { 0.0 },
            })
            .collect();

        let weights: Vec<f64> = positions.iter().map(|v| v.weight).collect();
        let portfolio_volatility = metrics::portfolio_volatility(
            &positions
                .iter()
                .map(|v| (v.weight, v.position.volatility))
                .collect::<Vec<_>>(),
        );
        let value_at_risk =
            metrics::parametric_var(total_value, portfolio_volatility, self.config.var_confidence, 1.0);
        let held: Vec<Position> = book.positions.values().cloned().collect();

        let risk = RiskMetrics {
            value_at_risk,
            var_pct: if total_value > 0.0 { value_at_risk / total_value } else { 0.0 },
            expected_shortfall: metrics::expected_shortfall(value_at_risk),
            concentration: metrics::herfindahl(&weights),
            largest_weight: weights.iter().copied().fold(0.0, f64::max),
            sector_exposure: metrics::sector_exposure(&held, total_value),
            portfolio_volatility,
            portfolio_beta: positions.iter().map(|v| v.weight * v.position.beta).sum(),
            drawdown: metrics::drawdown(total_value, book.high_water_mark),
        };

        PortfolioSnapshot {
            timestamp,
            total_value,
            cash: book.cash,
            positions,
            risk,
            high_water_mark: book.high_water_mark,
            fill_count: book.fill_count,
        }
    }

    /// Recorded snapshots, oldest first.
    pub fn history(&self) -> Vec<PortfolioSnapshot> {
        self.read().history.iter().cloned().collect()
    }

    pub fn performance(&self) -> PerformanceSummary {
        let book = self.read();
        let current_value = book.total_value();
        let initial_value = self.config.initial_cash;
        PerformanceSummary {
            initial_value,
            current_value,
            total_return: if initial_value > 0.0 { current_value / initial_value - 1.0 } else { 0.0 },
            realized_pnl: book.realized_pnl,
            unrealized_pnl: book.positions.values().map(Position::unrealized_pnl).sum(),
            fees_paid: book.fees_paid,
            high_water_mark: book.high_water_mark,
            drawdown: metrics::drawdown(current_value, book.high_water_mark),
            max_drawdown: book.max_drawdown,
            trades: book.trades.clone(),
        }
    }

    pub fn trade_stats(&self) -> TradeStats {
        self.read().trades.clone()
    }

    pub fn fill_count(&self) -> u64 {
        self.read().fill_count
    }

    /// Latest observed mark, falling back to the position's last fill price.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        let book = self.read();
        book.marks
            .get(symbol)
            .and_then(|m| m.back().copied())
            .or_else(|| book.positions.get(symbol).map(|p| p.last_price))
    }

    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.read().prices(symbol)
    }

    pub fn returns(&self, symbol: &str) -> Vec<f64> {
        metrics::returns(&self.prices(symbol))
    }

    pub fn volatility(&self, symbol: &str) -> f64 {
        self.read().volatility(symbol)
    }

    pub fn sector_of(&self, symbol: &str) -> Option<&str> {
        self.config.sectors.get(symbol).map(String::as_str)
    }

    pub fn drawdown(&self) -> f64 {
        let book = self.read();
        metrics::drawdown(book.total_value(), book.high_water_mark)
    }
}

impl PortfolioView for PortfolioState {
    fn total_value(&self) -> f64 {
        self.read().total_value()
    }

    fn cash(&self) -> f64 {
        self.read().cash
    }

    fn position(&self, symbol: &str) -> Option<Position> {
        self.read().positions.get(symbol).cloned()
    }

    fn positions(&self) -> Vec<Position> {
        self.read().positions.values().cloned().collect()
    }
}
