//! Trend following on a moving-average crossover confirmed by momentum and RSI.

use crate::indicators;
use chrono::Duration;
use log::{debug, info};
use trading::{Direction, MarketSnapshot, Position, Result, Signal, TradingError};
use trading_core::framework::{
    ExecutionContext, ParameterSpec, Parameters, PriceHistory, Strategy, StrategyDefinition,
};

pub const NAME: &str = "momentum";

/// RSI floor below which a trend is considered too weak to enter.
const RSI_ENTRY_FLOOR: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub short_window: usize,
    pub long_window: usize,
    pub rsi_window: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub momentum_threshold: f64,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_days: i64,
}

impl MomentumParams {
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let parsed = Self {
            short_window: params.usize_or("short_window", 20),
            long_window: params.usize_or("long_window", 50),
            rsi_window: params.usize_or("rsi_window", 14),
            rsi_overbought: params.f64_or("rsi_overbought", 70.0),
            rsi_oversold: params.f64_or("rsi_oversold", 30.0),
            momentum_threshold: params.f64_or("momentum_threshold", 0.02),
            position_size_pct: params.f64_or("position_size_pct", 0.1),
            stop_loss_pct: params.f64_or("stop_loss_pct", 0.05),
            take_profit_pct: params.f64_or("take_profit_pct", 0.15),
            max_hold_days: params.usize_or("max_hold_days", 30) as i64,
        };
        if parsed.short_window >= parsed.long_window {
            return Err(TradingError::validation(format!(
                "short_window ({}) must be below long_window ({})",
                parsed.short_window, parsed.long_window
            )));
        }
        if parsed.rsi_oversold >= parsed.rsi_overbought {
            return Err(TradingError::validation(
                "rsi_oversold must be below rsi_overbought",
            ));
        }
        Ok(parsed)
    }

    fn history_capacity(&self) -> usize {
        2 * self.long_window.max(self.rsi_window)
    }
}

pub struct Momentum {
    params: MomentumParams,
    history: PriceHistory,
    signals_generated: u64,
}

impl Momentum {
    pub fn new(params: MomentumParams) -> Self {
        Self {
            history: PriceHistory::new(params.history_capacity()),
            params,
            signals_generated: 0,
        }
    }

    fn entry(&self, symbol: &str, price: f64, prices: &[f64], ctx: &ExecutionContext) -> Option<Signal> {
        let p = &self.params;
        let short = indicators::sma(prices, p.short_window)?;
        let long = indicators::sma(prices, p.long_window)?;
        let rsi = indicators::rsi(prices, p.rsi_window).unwrap_or(50.0);
        let momentum = indicators::momentum(prices, p.short_window).unwrap_or(0.0);

        let bullish = short > long
            && momentum > p.momentum_threshold
            && rsi < p.rsi_overbought
            && rsi > RSI_ENTRY_FLOOR;
        if !bullish {
            return None;
        }

        let momentum_strength = (momentum / p.momentum_threshold).min(2.0);
        let rsi_strength = (rsi - RSI_ENTRY_FLOOR) / (p.rsi_overbought - RSI_ENTRY_FLOOR);
        let trend = (short - long).abs() / long;
        info!(
            "{}: BUY {} momentum {:.3} RSI {:.1}",
            ctx.id(),
            symbol,
            momentum,
            rsi
        );
        Some(
            Signal::buy(symbol, price, ctx.now())
                .with_strength((momentum_strength + rsi_strength) / 2.0)
                .with_confidence((trend * 10.0).min(0.9))
                .with_rationale(format!(
                    "Momentum buy: MA crossover, RSI={:.1}, Momentum={:.3}",
                    rsi, momentum
                )),
        )
    }

    fn exit(&self, position: &Position, price: f64, prices: &[f64], ctx: &ExecutionContext) -> Option<Signal> {
        let p = &self.params;
        let entry = position.average_entry_price;
        let sell = |strength: f64, confidence: f64, reason: String| {
            info!("{}: SELL {} ({})", ctx.id(), position.symbol, reason);
            Some(
                Signal::sell(&position.symbol, price, ctx.now())
                    .with_strength(strength)
                    .with_confidence(confidence)
                    .with_rationale(reason),
            )
        };

        if entry > 0.0 && price <= entry * (1.0 - p.stop_loss_pct) {
            return sell(1.0, 0.95, "Stop loss triggered".to_string());
        }
        if entry > 0.0 && price >= entry * (1.0 + p.take_profit_pct) {
            return sell(0.8, 0.85, "Take profit reached".to_string());
        }

        let short = indicators::sma(prices, p.short_window)?;
        let long = indicators::sma(prices, p.long_window)?;
        let rsi = indicators::rsi(prices, p.rsi_window).unwrap_or(50.0);
        if short < long && rsi > p.rsi_overbought {
            return sell(0.7, 0.75, format!("Momentum reversal: MA crossover, RSI={:.1}", rsi));
        }
        None
    }
}

impl Strategy for Momentum {
    fn initialize(&mut self, ctx: &ExecutionContext) -> Result<()> {
        info!(
            "{}: momentum on {:?} (SMA {}/{}, RSI {})",
            ctx.id(),
            ctx.symbols(),
            self.params.short_window,
            self.params.long_window,
            self.params.rsi_window
        );
        Ok(())
    }

    fn generate_signals(&mut self, ctx: &ExecutionContext, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        self.history.record(snapshot);

        let mut signals = Vec::new();
        for symbol in ctx.symbols() {
            let Some(price) = snapshot.price(symbol) else {
                continue;
            };
            let prices = self.history.prices(symbol);
            if prices.len() < self.params.long_window {
                continue;
            }
            let signal = match ctx.position(symbol).filter(|p| p.quantity > 0.0) {
                Some(position) => self.exit(position, price, &prices, ctx),
                None => self.entry(symbol, price, &prices, ctx),
            };
            signals.extend(signal);
        }
        self.signals_generated += signals.len() as u64;
        debug!("{}: {} signals", ctx.id(), signals.len());
        Ok(signals)
    }

    fn size_position(&self, signal: &Signal, ctx: &ExecutionContext) -> Option<f64> {
        match signal.direction {
            Direction::Buy if signal.price > 0.0 => Some(
                ctx.portfolio_value() * self.params.position_size_pct * signal.strength / signal.price,
            ),
            Direction::Sell => ctx.position(&signal.symbol).map(|p| p.quantity),
            _ => None,
        }
    }

    fn should_exit(&self, position: &Position, _price: f64, ctx: &ExecutionContext) -> bool {
        ctx.now() - position.opened_at > Duration::days(self.params.max_hold_days)
    }

    fn cleanup(&mut self, ctx: &ExecutionContext) {
        info!(
            "{}: momentum stopped after {} signals",
            ctx.id(),
            self.signals_generated
        );
    }
}

pub fn definition() -> StrategyDefinition {
    StrategyDefinition::new(
        NAME,
        "Follows trends using a moving-average crossover confirmed by momentum and RSI",
        |params| {
            let params = MomentumParams::from_parameters(params)?;
            Ok(Box::new(Momentum::new(params)) as Box<dyn Strategy>)
        },
    )
    .with_parameter(ParameterSpec::new("short_window", "Short moving average window", 20_i64).with_range(2.0, 200.0))
    .with_parameter(ParameterSpec::new("long_window", "Long moving average window", 50_i64).with_range(3.0, 500.0))
    .with_parameter(ParameterSpec::new("rsi_window", "RSI window", 14_i64).with_range(2.0, 100.0))
    .with_parameter(ParameterSpec::new("rsi_overbought", "RSI overbought level", 70.0).with_range(50.0, 100.0))
    .with_parameter(ParameterSpec::new("rsi_oversold", "RSI oversold level", 30.0).with_range(0.0, 50.0))
    .with_parameter(
        ParameterSpec::new("momentum_threshold", "Minimum momentum to enter", 0.02).with_range(0.0, 1.0),
    )
    .with_parameter(
        ParameterSpec::new("position_size_pct", "Suggested position as a fraction of portfolio", 0.1)
            .with_range(0.0, 1.0),
    )
    .with_parameter(ParameterSpec::new("stop_loss_pct", "Stop loss below entry", 0.05).with_range(0.0, 1.0))
    .with_parameter(ParameterSpec::new("take_profit_pct", "Take profit above entry", 0.15).with_range(0.0, 10.0))
    .with_parameter(ParameterSpec::new("max_hold_days", "Maximum holding period", 30_i64).with_range(1.0, 3650.0))
}
