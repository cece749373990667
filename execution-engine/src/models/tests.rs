use super::*;
use trading::{Fill, OrderId, OrderOrigin, OrderRequest, OrderState, Side, TradingError};

// --- Helpers ---

fn create_test_order(quantity: f64) -> Order {
    let request = OrderRequest::limit("RELIANCE", Side::Buy, quantity, 2_500.0, OrderOrigin::Manual);
    Order::new(OrderId::new(), request, 1)
}

// --- Order lifecycle ---

#[test]
fn test_order_follows_lifecycle_table() {
    let mut order = create_test_order(10.0);
    assert_eq!(order.state(), OrderState::Pending);

    order.transition(OrderState::Submitted, None).unwrap();
    order.transition(OrderState::PartiallyFilled, None).unwrap();
    order.transition(OrderState::PartiallyFilled, None).unwrap();
    order.transition(OrderState::Filled, Some("done".into())).unwrap();

    assert!(order.is_terminal());
    assert_eq!(order.message(), Some("done"));
    let err = order.transition(OrderState::Cancelled, None).unwrap_err();
    assert!(matches!(err, TradingError::InvalidTransition { .. }));
}

#[test]
fn test_pending_cannot_jump_to_filled() {
    let mut order = create_test_order(10.0);
    assert!(order.transition(OrderState::Filled, None).is_err());
    assert_eq!(order.state(), OrderState::Pending, "A refused transition leaves the state alone");
}

/// **Objective**: Cumulative fill totals use a quantity-weighted average price.
#[test]
fn test_record_fill_averages_price() {
    let mut order = create_test_order(10.0);
    order.record_fill(4.0, 100.0, 0.4);
    order.record_fill(6.0, 110.0, 0.66);

    assert!((order.filled_quantity() - 10.0).abs() < 1e-9);
    assert!((order.average_fill_price() - 106.0).abs() < 1e-9);
    assert!((order.fees() - 1.06).abs() < 1e-9);
    assert!(order.remaining_quantity().abs() < 1e-9);
}

#[test]
fn test_amend_rules() {
    let mut order = create_test_order(10.0);
    let signal = trading::SignalId::new();
    let mut original = order.request().clone();
    original.signal_id = Some(signal);
    order = Order::new(order.id(), original, 1);

    let cheaper = OrderRequest::limit("RELIANCE", Side::Buy, 8.0, 2_450.0, OrderOrigin::Manual);
    order.amend(cheaper).unwrap();
    assert_eq!(order.request().price, Some(2_450.0));
    assert_eq!(order.request().signal_id, Some(signal), "Amending keeps the originating signal");

    let flipped = OrderRequest::limit("RELIANCE", Side::Sell, 8.0, 2_450.0, OrderOrigin::Manual);
    assert!(order.amend(flipped).is_err());

    order.transition(OrderState::Submitted, None).unwrap();
    order.transition(OrderState::PartiallyFilled, None).unwrap();
    let later = OrderRequest::limit("RELIANCE", Side::Buy, 8.0, 2_400.0, OrderOrigin::Manual);
    assert!(order.amend(later).is_err(), "Partially filled orders are not amendable");
}

// --- Ledger ---

#[test]
fn test_fill_transaction_is_balanced() {
    let buy = Fill::new(OrderId::new(), "TCS", Side::Buy, 10.0, 3_500.0, 35.0);
    let sell = Fill::new(OrderId::new(), "TCS", Side::Sell, 10.0, 3_600.0, 36.0);

    for fill in [&buy, &sell] {
        let tx = Transaction::from_fill(fill);
        assert!(tx.is_balanced(), "Unbalanced transaction: {:?}", tx.entries);
        assert_eq!(tx.entries.len(), 3);
    }
    let tx = Transaction::from_fill(&buy);
    assert!((tx.entries[0].amount - (-35_035.0)).abs() < 1e-9);
}

#[test]
fn test_ledger_is_append_only_and_indexed() {
    let ledger = ExecutionLedger::default();
    let order_id = OrderId::new();
    ledger.append(
        Fill::new(order_id, "TCS", Side::Buy, 1.0, 100.0, 0.1),
        OrderOrigin::Manual,
        1,
    );
    ledger.append(
        Fill::new(OrderId::new(), "INFY", Side::Buy, 2.0, 50.0, 0.1),
        OrderOrigin::Rebalancer,
        2,
    );

    let records = ledger.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].index, 1);
    assert_eq!(records[1].index, 2);
    assert_eq!(ledger.for_order(order_id).len(), 1);
    assert!(ledger.is_balanced());
}

#[test]
fn test_ledger_writes_csv() {
    let path = std::env::temp_dir().join(format!("ledger-{}.csv", uuid::Uuid::new_v4()));
    let ledger = ExecutionLedger::new(Some(path.clone()));
    ledger.append(
        Fill::new(OrderId::new(), "TCS", Side::Buy, 1.0, 100.0, 0.1),
        OrderOrigin::Manual,
        1,
    );

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3, "One CSV row per ledger entry");
    assert!(lines[0].contains(",CASH,"));
    assert!(lines[1].contains(",POSITION:TCS,"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_config_defaults_from_empty_json() {
    let config: ExecutionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.broker_timeout_ms, 5_000);
    assert!(!config.allow_concurrent_orders);
    assert_eq!(config.broker_timeout(), std::time::Duration::from_secs(5));
}
