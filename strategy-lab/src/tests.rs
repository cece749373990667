use super::*;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use trading::{Direction, ExecutionId, MarketSnapshot, PortfolioView, Position, Signal};
use trading_core::framework::{ExecutionContext, ParameterValue, Strategy, StrategyRegistry};

// --- Helpers ---

#[derive(Default)]
struct StaticPortfolio {
    positions: Vec<Position>,
}

impl PortfolioView for StaticPortfolio {
    fn total_value(&self) -> f64 {
        100_000.0
    }

    fn cash(&self) -> f64 {
        100_000.0 - self.positions.iter().map(|p| p.market_value()).sum::<f64>()
    }

    fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.iter().find(|p| p.symbol == symbol).cloned()
    }

    fn positions(&self) -> Vec<Position> {
        self.positions.clone()
    }
}

fn create_test_position(symbol: &str, quantity: f64, entry: f64, opened_at: DateTime<Utc>) -> Position {
    let mut position = Position::new(symbol, entry, opened_at);
    position.quantity = quantity;
    position.average_entry_price = entry;
    position
}

fn create_test_strategy(name: &str, supplied: &[(&str, ParameterValue)]) -> (Box<dyn Strategy>, ExecutionContext) {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = StrategyRegistry::new();
    register_builtin(&registry);
    let definition = registry.lookup(name).unwrap();
    let supplied: HashMap<String, ParameterValue> =
        supplied.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    let parameters = definition.schema().resolve(&supplied).unwrap();
    let strategy = definition.instantiate(&parameters).unwrap();
    let mut ctx = ExecutionContext::new(
        ExecutionId::new(),
        name,
        "tester",
        vec!["TCS".to_string()],
        parameters,
    );
    ctx.refresh(Utc::now(), &StaticPortfolio::default());
    (strategy, ctx)
}

fn feed(strategy: &mut dyn Strategy, ctx: &ExecutionContext, prices: &[f64]) -> Vec<Signal> {
    let mut last = Vec::new();
    for price in prices {
        let snapshot = MarketSnapshot::new(Utc::now()).with_quote("TCS", *price, 1_000.0);
        last = strategy.generate_signals(ctx, &snapshot).unwrap();
    }
    last
}

/// Steady uptrend with pullbacks: +1.0 then -0.6, repeated.
fn create_test_uptrend(len: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..len)
        .map(|i| {
            price += if i % 2 == 0 { 1.0 } else { -0.6 };
            price
        })
        .collect()
}

/// 19 quiet prices around 100 followed by a sharp drop to 85.
fn create_test_selloff() -> Vec<f64> {
    let mut prices: Vec<f64> = (0..19).map(|i| if i % 2 == 0 { 100.0 } else { 100.5 }).collect();
    prices.push(85.0);
    prices
}

// --- Registration ---

#[test]
fn test_register_builtin() {
    let registry = StrategyRegistry::new();
    register_builtin(&registry);

    assert_eq!(registry.names(), vec!["mean_reversion", "momentum"]);
    let momentum = registry.lookup("momentum").unwrap();
    assert_eq!(momentum.schema().specs().len(), 10);
}

#[test]
fn test_momentum_rejects_inverted_windows() {
    let registry = StrategyRegistry::new();
    register_builtin(&registry);
    let definition = registry.lookup("momentum").unwrap();
    let supplied = HashMap::from([
        ("short_window".to_string(), ParameterValue::Integer(60)),
        ("long_window".to_string(), ParameterValue::Integer(30)),
    ]);

    let parameters = definition.schema().resolve(&supplied).unwrap();
    assert!(definition.instantiate(&parameters).is_err());
}

// --- Momentum ---

/// **Objective**: A confirmed uptrend produces a BUY once the long window is filled.
///
/// **Scenario**: RSI settles around 62 and 20-period momentum stays near 3%.
#[test]
fn test_momentum_buys_confirmed_uptrend() {
    let (mut strategy, ctx) = create_test_strategy("momentum", &[]);
    let prices = create_test_uptrend(60);

    assert!(feed(strategy.as_mut(), &ctx, &prices[..30]).is_empty(), "No signal before the long window");
    let signals = feed(strategy.as_mut(), &ctx, &prices[30..]);

    assert_eq!(signals.len(), 1);
    let signal = &signals[0];
    assert_eq!(signal.direction, Direction::Buy);
    assert!(signal.strength > 0.0 && signal.strength <= 1.0);
    assert!(signal.rationale.starts_with("Momentum buy"));

    let suggested = strategy.size_position(signal, &ctx).unwrap();
    let expected = 100_000.0 * 0.1 * signal.strength / signal.price;
    assert!((suggested - expected).abs() < 1e-9, "Expected {}, got {}", expected, suggested);
}

#[test]
fn test_momentum_ignores_flat_market() {
    let (mut strategy, ctx) = create_test_strategy("momentum", &[]);
    let signals = feed(strategy.as_mut(), &ctx, &[100.0; 60]);
    assert!(signals.is_empty());
}

#[test]
fn test_momentum_stop_loss_exit() {
    let (mut strategy, mut ctx) = create_test_strategy("momentum", &[]);
    let portfolio = StaticPortfolio {
        positions: vec![create_test_position("TCS", 10.0, 100.0, Utc::now())],
    };
    ctx.refresh(Utc::now(), &portfolio);

    let mut prices = vec![100.0; 50];
    prices.push(94.0);
    let signals = feed(strategy.as_mut(), &ctx, &prices);

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].direction, Direction::Sell);
    assert_eq!(signals[0].rationale, "Stop loss triggered");
    assert_eq!(strategy.size_position(&signals[0], &ctx), Some(10.0));
}

#[test]
fn test_should_exit_after_max_holding_period() {
    let (strategy, ctx) = create_test_strategy("mean_reversion", &[("max_hold_days", ParameterValue::Integer(5))]);

    let fresh = create_test_position("TCS", 1.0, 100.0, Utc::now() - Duration::days(2));
    let stale = create_test_position("TCS", 1.0, 100.0, Utc::now() - Duration::days(6));

    assert!(!strategy.should_exit(&fresh, 100.0, &ctx));
    assert!(strategy.should_exit(&stale, 100.0, &ctx));
}

// --- Mean reversion ---

#[test]
fn test_mean_reversion_buys_stretched_selloff() {
    let (mut strategy, ctx) = create_test_strategy("mean_reversion", &[]);

    let signals = feed(strategy.as_mut(), &ctx, &create_test_selloff());

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].direction, Direction::Buy);
    assert!((signals[0].price - 85.0).abs() < 1e-9);
    assert!(signals[0].confidence <= 0.85);
}

#[test]
fn test_mean_reversion_exits_near_mean() {
    let (mut strategy, mut ctx) = create_test_strategy("mean_reversion", &[]);
    let portfolio = StaticPortfolio {
        positions: vec![create_test_position("TCS", 20.0, 90.0, Utc::now())],
    };
    ctx.refresh(Utc::now(), &portfolio);

    let mut prices = create_test_selloff();
    prices.push(99.0);
    let signals = feed(strategy.as_mut(), &ctx, &prices);

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].direction, Direction::Sell);
    assert!(signals[0].rationale.starts_with("Mean reversion exit"));
}

#[test]
fn test_mean_reversion_never_opens_shorts() {
    let (mut strategy, ctx) = create_test_strategy("mean_reversion", &[]);
    let mut prices: Vec<f64> = (0..19).map(|i| if i % 2 == 0 { 100.0 } else { 100.5 }).collect();
    prices.push(118.0);

    let signals = feed(strategy.as_mut(), &ctx, &prices);

    assert!(signals.is_empty(), "Overbought without a position must not sell");
}
