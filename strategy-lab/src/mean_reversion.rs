//! Buys stretched sell-offs below the lower Bollinger band and exits on the way back to
//! the mean. Long only.

use crate::indicators::{self, Bands};
use chrono::Duration;
use log::{debug, info};
use trading::{Direction, MarketSnapshot, Position, Result, Signal, TradingError};
use trading_core::framework::{
    ExecutionContext, ParameterSpec, Parameters, PriceHistory, Strategy, StrategyDefinition,
};

pub const NAME: &str = "mean_reversion";

/// Fraction of the middle band at which a recovering long is closed.
const NEAR_MEAN: f64 = 0.98;

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversionParams {
    pub bollinger_window: usize,
    pub bollinger_std: f64,
    pub rsi_window: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub mean_reversion_threshold: f64,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold_days: i64,
}

impl MeanReversionParams {
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let parsed = Self {
            bollinger_window: params.usize_or("bollinger_window", 20),
            bollinger_std: params.f64_or("bollinger_std", 2.0),
            rsi_window: params.usize_or("rsi_window", 14),
            rsi_overbought: params.f64_or("rsi_overbought", 70.0),
            rsi_oversold: params.f64_or("rsi_oversold", 30.0),
            mean_reversion_threshold: params.f64_or("mean_reversion_threshold", 0.1),
            position_size_pct: params.f64_or("position_size_pct", 0.08),
            stop_loss_pct: params.f64_or("stop_loss_pct", 0.08),
            take_profit_pct: params.f64_or("take_profit_pct", 0.12),
            max_hold_days: params.usize_or("max_hold_days", 15) as i64,
        };
        if parsed.bollinger_window < 2 {
            return Err(TradingError::validation("bollinger_window must be at least 2"));
        }
        if parsed.rsi_oversold >= parsed.rsi_overbought {
            return Err(TradingError::validation(
                "rsi_oversold must be below rsi_overbought",
            ));
        }
        Ok(parsed)
    }
}

pub struct MeanReversion {
    params: MeanReversionParams,
    history: PriceHistory,
    signals_generated: u64,
}

impl MeanReversion {
    pub fn new(params: MeanReversionParams) -> Self {
        Self {
            history: PriceHistory::new(3 * params.bollinger_window.max(params.rsi_window + 1)),
            params,
            signals_generated: 0,
        }
    }

    fn entry(&self, symbol: &str, price: f64, bands: Bands, rsi: f64, ctx: &ExecutionContext) -> Option<Signal> {
        let p = &self.params;
        let deviation = (price - bands.middle).abs() / bands.middle;
        if price <= bands.lower && rsi < p.rsi_oversold && deviation > p.mean_reversion_threshold {
            let deviation_strength = (deviation / p.mean_reversion_threshold).min(2.0);
            let rsi_strength = (p.rsi_oversold - rsi) / p.rsi_oversold;
            info!(
                "{}: BUY {} below lower band, RSI {:.1}, deviation {:.3}",
                ctx.id(),
                symbol,
                rsi,
                deviation
            );
            return Some(
                Signal::buy(symbol, price, ctx.now())
                    .with_strength((deviation_strength + rsi_strength) / 2.0)
                    .with_confidence((deviation_strength * 0.4).min(0.85))
                    .with_rationale(format!(
                        "Mean reversion buy: Oversold (BB lower), RSI={:.1}, Deviation={:.3}",
                        rsi, deviation
                    )),
            );
        }
        if price >= bands.upper && rsi > p.rsi_overbought {
            debug!("{}: {} overbought but not held; no short entries", ctx.id(), symbol);
        }
        None
    }

    fn exit(&self, position: &Position, price: f64, bands: Bands, rsi: f64, ctx: &ExecutionContext) -> Option<Signal> {
        let p = &self.params;
        let entry = position.average_entry_price;
        let (strength, confidence, reason) = if entry > 0.0 && price <= entry * (1.0 - p.stop_loss_pct) {
            (1.0, 0.95, "Stop loss triggered".to_string())
        } else if entry > 0.0 && price >= entry * (1.0 + p.take_profit_pct) {
            (0.8, 0.85, "Take profit reached".to_string())
        } else if price >= bands.middle * NEAR_MEAN || rsi > p.rsi_overbought {
            (0.7, 0.75, format!("Mean reversion exit: Price near mean, RSI={:.1}", rsi))
        } else {
            return None;
        };
        info!("{}: SELL {} ({})", ctx.id(), position.symbol, reason);
        Some(
            Signal::sell(&position.symbol, price, ctx.now())
                .with_strength(strength)
                .with_confidence(confidence)
                .with_rationale(reason),
        )
    }
}

impl Strategy for MeanReversion {
    fn generate_signals(&mut self, ctx: &ExecutionContext, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        self.history.record(snapshot);

        let mut signals = Vec::new();
        for symbol in ctx.symbols() {
            let Some(price) = snapshot.price(symbol) else {
                continue;
            };
            let prices = self.history.prices(symbol);
            let Some(bands) = indicators::bollinger(&prices, self.params.bollinger_window, self.params.bollinger_std)
            else {
                continue;
            };
            if bands.middle <= 0.0 {
                continue;
            }
            let rsi = indicators::rsi(&prices, self.params.rsi_window).unwrap_or(50.0);
            let signal = match ctx.position(symbol).filter(|p| p.quantity > 0.0) {
                Some(position) => self.exit(position, price, bands, rsi, ctx),
                None => self.entry(symbol, price, bands, rsi, ctx),
            };
            signals.extend(signal);
        }
        self.signals_generated += signals.len() as u64;
        Ok(signals)
    }

    fn size_position(&self, signal: &Signal, ctx: &ExecutionContext) -> Option<f64> {
        match signal.direction {
            Direction::Buy if signal.price > 0.0 => Some(
                ctx.portfolio_value() * self.params.position_size_pct * signal.strength / signal.price,
            ),
            Direction::Sell => ctx.position(&signal.symbol).map(|p| p.quantity.abs()),
            _ => None,
        }
    }

    fn should_exit(&self, position: &Position, _price: f64, ctx: &ExecutionContext) -> bool {
        ctx.now() - position.opened_at > Duration::days(self.params.max_hold_days)
    }

    fn cleanup(&mut self, ctx: &ExecutionContext) {
        info!(
            "{}: mean reversion stopped after {} signals",
            ctx.id(),
            self.signals_generated
        );
    }
}

pub fn definition() -> StrategyDefinition {
    StrategyDefinition::new(
        NAME,
        "Buys oversold dips below the lower Bollinger band and exits near the mean",
        |params| {
            let params = MeanReversionParams::from_parameters(params)?;
            Ok(Box::new(MeanReversion::new(params)) as Box<dyn Strategy>)
        },
    )
    .with_parameter(ParameterSpec::new("bollinger_window", "Bollinger band window", 20_i64).with_range(2.0, 500.0))
    .with_parameter(ParameterSpec::new("bollinger_std", "Band width in standard deviations", 2.0).with_range(0.5, 5.0))
    .with_parameter(ParameterSpec::new("rsi_window", "RSI window", 14_i64).with_range(2.0, 100.0))
    .with_parameter(ParameterSpec::new("rsi_overbought", "RSI overbought level", 70.0).with_range(50.0, 100.0))
    .with_parameter(ParameterSpec::new("rsi_oversold", "RSI oversold level", 30.0).with_range(0.0, 50.0))
    .with_parameter(
        ParameterSpec::new("mean_reversion_threshold", "Minimum distance from the mean to enter", 0.1)
            .with_range(0.0, 1.0),
    )
    .with_parameter(
        ParameterSpec::new("position_size_pct", "Suggested position as a fraction of portfolio", 0.08)
            .with_range(0.0, 1.0),
    )
    .with_parameter(ParameterSpec::new("stop_loss_pct", "Stop loss below entry", 0.08).with_range(0.0, 1.0))
    .with_parameter(ParameterSpec::new("take_profit_pct", "Take profit above entry", 0.12).with_range(0.0, 10.0))
    .with_parameter(ParameterSpec::new("max_hold_days", "Maximum holding period", 15_i64).with_range(1.0, 3650.0))
}
