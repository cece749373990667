//! Historical replay of one strategy.
//!
//! Recorded snapshots are stepped through a [`ReplayRunner`] on their own timestamps, sized
//! by a private [`RiskGate`] and filled on paper into a private [`PortfolioState`]. The live
//! book, gate and pipeline are never touched.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use portfolio_manager::{metrics, PortfolioConfig, PortfolioState};
use risk_manager::{RiskConfig, RiskGate, SignalInputs};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trading::{
    Fill, MarketSnapshot, OrderId, OrderOrigin, OrderRequest, PortfolioView, Result, Side, TradingError,
};
use trading_core::framework::history::TRADING_DAYS_PER_YEAR;
use trading_core::framework::{ExecutionRequest, ReplayRunner, RuntimeConfig, StrategyRegistry};

/// Paper fill model of a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Fees as a fraction of notional.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    /// Adverse price move applied to every fill, as a fraction of the mark.
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    /// Starting cash. Falls back to the portfolio section's `initial_cash`.
    #[serde(default)]
    pub initial_cash: Option<f64>,
}

fn default_fee_rate() -> f64 {
    0.0005
}

fn default_slippage() -> f64 {
    0.0001
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            slippage: default_slippage(),
            initial_cash: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
    pub cash: f64,
}

/// One paper fill, with the P&L it realised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub fees: f64,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub symbols: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub steps: usize,
    pub initial_value: f64,
    pub final_value: f64,
    /// Fractional return over the whole replay.
    pub total_return: f64,
    /// `None` when the replay spans less than a day.
    pub annualized_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    /// Share of closing trades that made money. `None` until something was sold.
    pub win_rate: Option<f64>,
    pub closed_trades: u64,
    pub fees_paid: f64,
    pub signals: u64,
    pub declined: u64,
    pub faults: u64,
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Replays recorded market data through a registered strategy.
pub struct Backtester {
    registry: Arc<StrategyRegistry>,
    portfolio: PortfolioConfig,
    risk: RiskConfig,
    runtime: RuntimeConfig,
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        portfolio: PortfolioConfig,
        risk: RiskConfig,
        runtime: RuntimeConfig,
        config: BacktestConfig,
    ) -> Self {
        Self {
            registry,
            portfolio,
            risk,
            runtime,
            config,
        }
    }

    /// Runs `request` over `snapshots`, oldest first whatever order they come in.
    ///
    /// A faulting strategy hook skips that step, as it would skip a live tick. Only an
    /// unusable request or an empty series fails the replay.
    pub fn run(&self, request: &ExecutionRequest, snapshots: &[MarketSnapshot]) -> Result<BacktestReport> {
        let mut series: Vec<&MarketSnapshot> = snapshots.iter().collect();
        series.sort_by_key(|s| s.timestamp);
        let (Some(first), Some(last)) = (series.first().copied(), series.last().copied()) else {
            return Err(TradingError::validation("no market snapshots to replay"));
        };

        let mut portfolio_config = self.portfolio.clone();
        if let Some(cash) = self.config.initial_cash {
            portfolio_config.initial_cash = cash;
        }
        let sectors = portfolio_config.sectors.clone();
        let portfolio = PortfolioState::new(portfolio_config);
        let gate = RiskGate::new(self.risk.clone()).with_sectors(sectors);

        let (context, strategy) = self.registry.instantiate(request)?;
        let origin = OrderOrigin::Execution(context.id());
        let mut replay = ReplayRunner::new(context, strategy, self.runtime.history_size);

        portfolio.mark_to_market(first);
        replay.initialize(first, &portfolio)?;
        info!(
            "Backtest of '{}' on {:?}: {} snapshots from {} to {}",
            request.strategy,
            request.symbols,
            series.len(),
            first.timestamp,
            last.timestamp
        );

        let initial_value = portfolio.total_value();
        let mut report = BacktestReport {
            strategy: request.strategy.clone(),
            symbols: request.symbols.clone(),
            start: first.timestamp,
            end: last.timestamp,
            steps: series.len(),
            initial_value,
            final_value: initial_value,
            total_return: 0.0,
            annualized_return: None,
            sharpe_ratio: None,
            max_drawdown: 0.0,
            win_rate: None,
            closed_trades: 0,
            fees_paid: 0.0,
            signals: 0,
            declined: 0,
            faults: 0,
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(series.len()),
        };

        for snapshot in series {
            portfolio.mark_to_market(snapshot);
            match replay.step(snapshot, &portfolio) {
                Ok(envelopes) => {
                    for envelope in envelopes {
                        report.signals += 1;
                        let inputs = SignalInputs {
                            volatility: envelope.stats.volatility,
                            atr: envelope.stats.atr,
                            expected_return: envelope.stats.expected_return,
                            size_hint: envelope.suggested_quantity,
                        };
                        let decision = gate.evaluate(&envelope.signal, &portfolio, &inputs);
                        let Some(order) = decision.order_request(origin) else {
                            report.declined += 1;
                            continue;
                        };
                        match self.paper_fill(&order, snapshot, &portfolio) {
                            Ok(trade) => report.trades.push(trade),
                            Err(e) => {
                                debug!("Backtest order {} {} not filled: {}", order.side, order.symbol, e);
                                report.declined += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Backtest step at {} skipped: {}", snapshot.timestamp, e);
                    report.faults += 1;
                }
            }

            let marked = portfolio.snapshot_at(snapshot.timestamp);
            gate.check_portfolio(&marked);
            report.equity_curve.push(EquityPoint {
                timestamp: snapshot.timestamp,
                total_value: marked.total_value,
                cash: marked.cash,
            });
        }
        replay.finish();

        let performance = portfolio.performance();
        report.final_value = performance.current_value;
        report.total_return = if initial_value > 0.0 {
            report.final_value / initial_value - 1.0
        } else {
            0.0
        };
        report.max_drawdown = performance.max_drawdown;
        report.fees_paid = performance.fees_paid;
        report.win_rate = performance.trades.win_rate();
        report.closed_trades = performance.trades.trades();

        let days = (report.end - report.start).num_seconds() as f64 / 86_400.0;
        if days >= 1.0 && initial_value > 0.0 && report.final_value > 0.0 {
            report.annualized_return = Some((report.final_value / initial_value).powf(365.0 / days) - 1.0);
        }
        let values: Vec<f64> = report.equity_curve.iter().map(|p| p.total_value).collect();
        let returns = metrics::returns(&values);
        report.sharpe_ratio = metrics::std_dev(&returns)
            .filter(|sd| *sd > 0.0)
            .map(|sd| metrics::mean(&returns) / sd * TRADING_DAYS_PER_YEAR.sqrt());

        info!(
            "Backtest of '{}' done: return {:.2}%, max drawdown {:.2}%, {} fills, win rate {}",
            report.strategy,
            report.total_return * 100.0,
            report.max_drawdown * 100.0,
            report.trades.len(),
            report
                .win_rate
                .map(|w| format!("{:.1}%", w * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(report)
    }

    /// Fills `order` in full at the snapshot's mark, moved against the order by the slippage.
    fn paper_fill(&self, order: &OrderRequest, snapshot: &MarketSnapshot, portfolio: &PortfolioState) -> Result<BacktestTrade> {
        let Some(mark) = snapshot.price(&order.symbol) else {
            return Err(TradingError::validation(format!("no price for {}", order.symbol)));
        };
        let price = match order.side {
            Side::Buy => mark * (1.0 + self.config.slippage),
            Side::Sell => mark * (1.0 - self.config.slippage),
        };
        let fees = order.quantity * price * self.config.fee_rate;
        if order.side == Side::Buy && order.quantity * price + fees > portfolio.cash() {
            return Err(TradingError::validation("insufficient cash"));
        }

        let mut fill = Fill::new(OrderId::new(), &order.symbol, order.side, order.quantity, price, fees);
        fill.timestamp = snapshot.timestamp;
        let realized_pnl = portfolio.apply_fill(&fill)?;
        Ok(BacktestTrade {
            timestamp: fill.timestamp,
            symbol: fill.symbol,
            side: fill.side,
            quantity: fill.quantity,
            price: fill.price,
            fees: fill.fees,
            realized_pnl,
        })
    }
}
