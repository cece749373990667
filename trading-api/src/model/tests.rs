use super::execution::ExecutionState;
use super::fill::Fill;
use super::identity::OrderId;
use super::order::{OrderState, OrderType, Side};
use super::response::ServiceResponse;
use super::signal::{Direction, Signal};
use chrono::Utc;

#[test]
fn test_order_state_table() {
    use OrderState::*;

    let legal = [
        (Pending, Submitted),
        (Pending, Cancelled),
        (Pending, Error),
        (Submitted, PartiallyFilled),
        (Submitted, Filled),
        (Submitted, Rejected),
        (Submitted, Cancelled),
        (Submitted, Expired),
        (Submitted, Error),
        (PartiallyFilled, PartiallyFilled),
        (PartiallyFilled, Filled),
        (PartiallyFilled, Cancelled),
        (PartiallyFilled, Expired),
        (PartiallyFilled, Error),
    ];

    for from in OrderState::ALL {
        for to in OrderState::ALL {
            let expected = legal.contains(&(from, to));
            assert_eq!(
                from.can_transition_to(to),
                expected,
                "Transition {} -> {} should be {}",
                from,
                to,
                if expected { "legal" } else { "illegal" }
            );
        }
    }
}

#[test]
fn test_terminal_states_have_no_exit() {
    for state in OrderState::ALL.into_iter().filter(|s| s.is_terminal()) {
        assert!(!state.is_amendable());
        for next in OrderState::ALL {
            assert!(!state.can_transition_to(next), "{} must be terminal", state);
        }
    }
}

#[test]
fn test_execution_state_table() {
    use ExecutionState::*;

    assert!(Created.can_transition_to(Initializing));
    assert!(Initializing.can_transition_to(Running));
    assert!(Initializing.can_transition_to(Error));
    assert!(Running.can_transition_to(Stopping));
    assert!(Stopping.can_transition_to(Stopped));

    assert!(!Running.can_transition_to(Initializing));
    assert!(!Stopped.can_transition_to(Running));
    assert!(!Created.can_transition_to(Running));
    assert!(!Error.can_transition_to(Stopped));
}

#[test]
fn test_order_type_requirements() {
    assert!(!OrderType::Market.requires_price());
    assert!(OrderType::Limit.requires_price());
    assert!(!OrderType::Limit.requires_trigger());
    assert!(OrderType::StopLoss.requires_price());
    assert!(OrderType::StopLoss.requires_trigger());
    assert!(!OrderType::StopLossMarket.requires_price());
    assert!(OrderType::TakeProfitMarket.requires_trigger());
}

#[test]
fn test_signal_strength_is_clamped() {
    let s = Signal::buy("RELIANCE", 2500.0, Utc::now())
        .with_strength(1.7)
        .with_confidence(f64::NAN);
    assert_eq!(s.strength, 1.0);
    assert_eq!(s.confidence, 0.0);
    assert_eq!(s.direction, Direction::Buy);

    let hold = Signal::new("RELIANCE", Direction::Hold, 2500.0, Utc::now());
    assert!(!hold.is_actionable());
}

#[test]
fn test_fill_cash_delta() {
    let buy = Fill::new(OrderId::new(), "A", Side::Buy, 10.0, 100.0, 1.0);
    assert!((buy.cash_delta() + 1001.0).abs() < 1e-9);

    let sell = Fill::new(OrderId::new(), "A", Side::Sell, 10.0, 100.0, 1.0);
    assert!((sell.cash_delta() - 999.0).abs() < 1e-9);
}

#[test]
fn test_service_response_from_result() {
    let ok: ServiceResponse = Ok::<_, String>("started").into();
    assert!(ok.success);
    assert_eq!(ok.message, "started");

    let err: ServiceResponse = Err::<&str, _>("boom").into();
    assert!(!err.success);
    assert_eq!(err.message, "boom");
}

#[test]
fn test_order_state_serializes_screaming() {
    let json = serde_json::to_string(&OrderState::PartiallyFilled).unwrap();
    assert_eq!(json, "\"PARTIALLY_FILLED\"");
}

#[test]
fn test_position_average_price_and_realized_pnl() {
    use super::position::Position;

    let now = Utc::now();
    let mut p = Position::new("A", 100.0, now);
    p.apply_fill(Side::Buy, 10.0, 100.0, now);
    p.apply_fill(Side::Buy, 10.0, 110.0, now);
    assert!((p.average_entry_price - 105.0).abs() < 1e-9);

    let realized = p.apply_fill(Side::Sell, 5.0, 115.0, now);
    assert!((realized - 50.0).abs() < 1e-9, "Expected 50.0 realised, got {}", realized);
    assert!((p.quantity - 15.0).abs() < 1e-9);
    assert!((p.average_entry_price - 105.0).abs() < 1e-9);

    p.last_price = 120.0;
    assert!((p.unrealized_pnl() - 225.0).abs() < 1e-9);
}
