use super::*;
use chrono::Utc;
use portfolio_manager::{PortfolioConfig, PortfolioState};
use trading::{Direction, Fill, MarketSnapshot, OrderId, OrderOrigin, Side, Signal};

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_test_portfolio(cash: f64) -> PortfolioState {
    PortfolioState::new(PortfolioConfig::default().with_initial_cash(cash))
}

fn create_test_signal(direction: Direction, symbol: &str, price: f64, strength: f64) -> Signal {
    Signal::new(symbol, direction, price, Utc::now()).with_strength(strength)
}

fn buy(portfolio: &PortfolioState, symbol: &str, qty: f64, price: f64) {
    portfolio
        .apply_fill(&Fill::new(OrderId::new(), symbol, Side::Buy, qty, price, 0.0))
        .unwrap();
}

/// **Objective**: Kelly sizing with default priors hits the position cap.
///
/// **Scenario**: BUY RELIANCE @ 2500, strength 1.0, portfolio 100 000, max position 10%.
/// Expect 4 shares (100 000 × 0.1 / 2500).
#[test]
fn test_reliance_scenario_sizes_four_shares() {
    setup();
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(100_000.0);
    let signal = create_test_signal(Direction::Buy, "RELIANCE", 2500.0, 1.0);

    let decision = gate.evaluate(&signal, &portfolio, &SignalInputs::default());

    assert!(decision.is_approved(), "Expected approval, got {:?}", decision.rejection);
    assert!((decision.approved_quantity - 4.0).abs() < 1e-9, "Expected 4, got {}", decision.approved_quantity);
    assert_eq!(decision.sizing_method, "kelly");
    assert!((decision.stop_loss().unwrap() - 2375.0).abs() < 1e-6);
    assert!((decision.take_profit().unwrap() - 2875.0).abs() < 1e-6);

    let request = decision.order_request(OrderOrigin::Manual).unwrap();
    assert_eq!(request.side, Side::Buy);
    assert_eq!(request.signal_id, Some(signal.id));
}

#[test]
fn test_sized_quantity_never_exceeds_bound() {
    setup();
    let portfolio = create_test_portfolio(100_000.0);
    for sizing in [PositionSizing::Kelly, PositionSizing::SharpeOptimal, PositionSizing::FixedFraction] {
        let config = RiskConfig {
            position_sizing: sizing,
            position_fraction: 0.5,
            ..RiskConfig::default()
        };
        let gate = RiskGate::new(config);
        for price in [0.37, 12.0, 999.0, 2500.0, 150_000.0] {
            for strength in [0.0, 0.3, 1.0] {
                let signal = create_test_signal(Direction::Buy, "X", price, strength);
                let inputs = SignalInputs {
                    volatility: Some(0.05),
                    expected_return: Some(0.5),
                    ..Default::default()
                };
                let decision = gate.evaluate(&signal, &portfolio, &inputs);
                let bound = 0.1 * 100_000.0 / price;
                assert!(
                    decision.approved_quantity <= bound + 1e-9,
                    "{:?} @ {}: {} > {}",
                    sizing,
                    price,
                    decision.approved_quantity,
                    bound
                );
                assert_eq!(decision.approved_quantity, decision.approved_quantity.floor());
            }
        }
    }
}

#[test]
fn test_strength_scales_quantity() {
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(100_000.0);
    let signal = create_test_signal(Direction::Buy, "X", 100.0, 0.5);
    let decision = gate.evaluate(&signal, &portfolio, &SignalInputs::default());
    assert!((decision.approved_quantity - 50.0).abs() < 1e-9);
}

#[test]
fn test_sizing_fallbacks() {
    let inputs = SizingInputs {
        price: 100.0,
        portfolio_value: 100_000.0,
        strength: 1.0,
        win_rate: 0.9,
        avg_win: 0.1,
        avg_loss: 0.0,
        volatility: None,
        expected_return: None,
    };
    let kelly = sizing::Kelly {
        max_fraction: 0.1,
        fallback_fraction: 0.02,
    };
    assert!((kelly.fraction(&inputs) - 0.02).abs() < 1e-12, "Non-positive loss falls back");

    let sharpe = sizing::SharpeOptimal {
        max_fraction: 0.1,
        fallback_fraction: 0.02,
        risk_free_rate: 0.05,
        default_expected_return: 0.1,
    };
    assert!((sharpe.fraction(&inputs) - 0.02).abs() < 1e-12, "Missing volatility falls back");

    let with_vol = SizingInputs {
        volatility: Some(0.5),
        ..inputs.clone()
    };
    // ((0.1 - 0.05) / 0.5) / (2 × 0.5) = 0.1
    assert!((sharpe.fraction(&with_vol) - 0.1).abs() < 1e-12);

    let losing = SizingInputs {
        win_rate: 0.2,
        avg_loss: 0.1,
        ..inputs
    };
    assert_eq!(kelly.fraction(&losing), 0.0, "Negative edge sizes to zero");
}

#[test]
fn test_sell_is_long_only() {
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(100_000.0);

    let no_position = gate.evaluate(&create_test_signal(Direction::Sell, "X", 100.0, 1.0), &portfolio, &SignalInputs::default());
    assert!(!no_position.is_approved());
    assert_eq!(no_position.approved_quantity, 0.0);

    buy(&portfolio, "X", 30.0, 100.0);
    let exit = gate.evaluate(&create_test_signal(Direction::Sell, "X", 100.0, 0.2), &portfolio, &SignalInputs::default());
    assert!(exit.is_approved());
    assert!((exit.approved_quantity - 30.0).abs() < 1e-9, "Exit sells the whole holding");
}

#[test]
fn test_hold_is_rejected() {
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(100_000.0);
    let decision = gate.evaluate(&create_test_signal(Direction::Hold, "X", 100.0, 1.0), &portfolio, &SignalInputs::default());
    assert!(decision.side.is_none());
    assert!(decision.rejection.is_some());
}

#[test]
fn test_existing_position_and_cash_trim() {
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(100_000.0);
    buy(&portfolio, "X", 60.0, 100.0);

    // Cap is 10 000; 6 000 already held leaves room for 40.
    let decision = gate.evaluate(&create_test_signal(Direction::Buy, "X", 100.0, 1.0), &portfolio, &SignalInputs::default());
    assert!((decision.approved_quantity - 40.0).abs() < 1e-9);
    assert!(decision.adjustment.as_deref().unwrap_or_default().starts_with("MaxPositionSize"));

    let broke = create_test_portfolio(1_000.0);
    buy(&broke, "Y", 9.0, 100.0);
    let decision = gate.evaluate(&create_test_signal(Direction::Buy, "Z", 10.0, 1.0), &broke, &SignalInputs::default());
    assert!(decision.approved_quantity <= 9.0, "Only 100 cash left");
}

#[test]
fn test_sector_limit_trims() {
    let config = RiskConfig {
        max_position_size: 0.5,
        max_sector_exposure: 0.3,
        ..RiskConfig::default()
    };
    let mut sectors = std::collections::HashMap::new();
    sectors.insert("A".to_string(), "TECH".to_string());
    sectors.insert("B".to_string(), "TECH".to_string());
    let gate = RiskGate::new(config).with_sectors(sectors);
    let portfolio = create_test_portfolio(100_000.0);
    buy(&portfolio, "A", 250.0, 100.0);

    let inputs = SignalInputs {
        size_hint: Some(100.0),
        ..Default::default()
    };
    let decision = gate.evaluate(&create_test_signal(Direction::Buy, "B", 100.0, 1.0), &portfolio, &inputs);
    assert!((decision.approved_quantity - 50.0).abs() < 1e-9, "Sector room is 5 000");
}

/// **Objective**: A drawdown breach halts sizing until explicitly cleared.
#[test]
fn test_hard_breach_blocks_until_cleared() {
    setup();
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = create_test_portfolio(20_000.0);
    buy(&portfolio, "X", 150.0, 100.0);
    portfolio.mark_to_market(&MarketSnapshot::new(Utc::now()).with_quote("X", 70.0, 1.0));

    let alerts = gate.check_portfolio(&portfolio.snapshot());
    assert!(alerts.iter().any(|a| a.kind == AlertKind::Drawdown && a.severity == AlertSeverity::Critical));
    assert!(gate.is_halted());

    // Recovery does not lift the halt.
    portfolio.mark_to_market(&MarketSnapshot::new(Utc::now()).with_quote("X", 100.0, 1.0));
    let decision = gate.evaluate(&create_test_signal(Direction::Buy, "Y", 10.0, 1.0), &portfolio, &SignalInputs::default());
    assert_eq!(decision.approved_quantity, 0.0);
    assert!(decision.rejection.unwrap().contains("halted"));

    assert!(gate.clear_hard_breach());
    let decision = gate.evaluate(&create_test_signal(Direction::Buy, "Y", 10.0, 1.0), &portfolio, &SignalInputs::default());
    assert!(decision.approved_quantity > 0.0);
}

#[test]
fn test_soft_alerts_are_deduplicated_and_clearable() {
    let gate = RiskGate::new(RiskConfig::default());
    let portfolio = PortfolioState::new(
        PortfolioConfig::default()
            .with_initial_cash(10_000.0)
            .with_sector("A", "TECH")
            .with_sector("B", "TECH"),
    );
    buy(&portfolio, "A", 30.0, 100.0);
    buy(&portfolio, "B", 20.0, 100.0);

    let first = gate.check_portfolio(&portfolio.snapshot());
    assert!(first.iter().any(|a| a.kind == AlertKind::SectorExposure && a.subject == "TECH"));
    assert!(!gate.is_halted(), "Soft limits never halt");

    let second = gate.check_portfolio(&portfolio.snapshot());
    assert_eq!(first.len(), second.len());
    let id = |alerts: &[RiskAlert]| alerts.iter().find(|a| a.kind == AlertKind::SectorExposure).map(|a| a.id);
    assert_eq!(id(&first), id(&second), "Re-raised alert keeps its identity");

    assert_eq!(gate.clear_alerts(), second.len());
    assert!(gate.get_active_alerts().is_empty());
}

#[test]
fn test_config_accepts_aliases() {
    let config: RiskConfig = serde_json::from_str(r#"{"position_sizing": "optimal", "var_limit": 0.03}"#).unwrap();
    assert_eq!(config.position_sizing, PositionSizing::SharpeOptimal);
    assert!((config.var_limit - 0.03).abs() < 1e-12);
    assert!((config.max_position_size - 0.1).abs() < 1e-12);
}
