use async_trait::async_trait;
use broker_gateway::{BrokerConfig, PaperBroker, QuoteFeed};
use portfolio_manager::RebalanceState;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use system_orchestrator::{
    AppConfig, BacktestReport, HealthReport, HealthStatus, SystemEvent, TradingSystem,
};
use trading::{
    BrokerGateway, BrokerOrderStatus, ExecutionId, ExecutionState, MarketSnapshot, OrderId, OrderOrigin, OrderRequest,
    OrderState, PortfolioView, QueryFilter, Result, ServiceResponse, Side, Signal, SubmitOutcome,
};
use trading_core::framework::{
    ExecutionContext, ExecutionRequest, Strategy, StrategyDefinition, StrategyRegistry,
};

// --- Helpers ---

/// Buys every subscribed symbol once, capped at `size` units.
struct BuyOnce {
    size: f64,
    emitted: bool,
}

impl Strategy for BuyOnce {
    fn generate_signals(&mut self, ctx: &ExecutionContext, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        if self.emitted {
            return Ok(Vec::new());
        }
        let signals: Vec<Signal> = ctx
            .symbols()
            .iter()
            .filter_map(|s| snapshot.price(s).map(|p| Signal::buy(s, p, snapshot.timestamp)))
            .collect();
        self.emitted = !signals.is_empty();
        Ok(signals)
    }

    fn size_position(&self, _signal: &Signal, _ctx: &ExecutionContext) -> Option<f64> {
        Some(self.size)
    }
}

fn create_test_registry() -> Arc<StrategyRegistry> {
    let registry = StrategyRegistry::new();
    registry.register(StrategyDefinition::new("buy_once", "buys each symbol once", |_| {
        Ok(Box::new(BuyOnce {
            size: 10.0,
            emitted: false,
        }) as Box<dyn Strategy>)
    }));
    Arc::new(registry)
}

fn create_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.execution.broker_timeout_ms = 500;
    config.execution.fill_poll_interval_ms = 5;
    config.execution.fill_poll_attempts = 3;
    config.execution.working_order_sweep_ms = 20;
    config.strategy.tick_interval_ms = 20;
    config.strategy.error_backoff_ms = 20;
    config.strategy.max_backoff_ms = 100;
    config.portfolio.initial_cash = 100_000.0;
    config.portfolio.auto_rebalance = false;
    config.portfolio.max_position_size = 0.6;
    config.risk.max_position_size = 0.5;
    config.system.snapshot_interval_ms = 20;
    config
}

fn create_test_broker() -> Arc<PaperBroker> {
    Arc::new(PaperBroker::new(
        BrokerConfig {
            volatility: 0.0,
            seed: Some(7),
            ..BrokerConfig::default()
        }
        .with_price("AAA", 100.0)
        .with_price("BBB", 50.0),
    ))
}

fn create_test_system(config: AppConfig) -> (TradingSystem, Arc<PaperBroker>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let broker = create_test_broker();
    let feed = Arc::new(QuoteFeed::new(broker.clone()));
    let system = TradingSystem::builder(config, broker.clone(), feed)
        .registry(create_test_registry())
        .start();
    (system, broker)
}

/// Paper broker whose connectivity check hangs while `stalled` is set.
struct StallingBroker {
    inner: Arc<PaperBroker>,
    stalled: AtomicBool,
}

#[async_trait]
impl BrokerGateway for StallingBroker {
    async fn submit_order(&self, order_id: &OrderId, request: &OrderRequest) -> Result<SubmitOutcome> {
        self.inner.submit_order(order_id, request).await
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<bool> {
        self.inner.cancel_order(broker_order_id).await
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<BrokerOrderStatus> {
        self.inner.get_order_status(broker_order_id).await
    }

    async fn is_connected(&self) -> bool {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.is_connected().await
    }

    async fn get_quote(&self, symbols: &[String]) -> Result<MarketSnapshot> {
        self.inner.get_quote(symbols).await
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

fn order_id_of(response: &ServiceResponse) -> OrderId {
    let data = response.data.as_ref().expect("response carries data");
    serde_json::from_value(data["order_id"].clone()).unwrap()
}

fn execution_id_of(response: &ServiceResponse) -> ExecutionId {
    let data = response.data.as_ref().expect("response carries data");
    serde_json::from_value(data["execution_id"].clone()).unwrap()
}

fn health_of(response: &ServiceResponse) -> HealthReport {
    serde_json::from_value(response.data.clone().expect("health carries a report")).unwrap()
}

// --- Signal routing ---

/// **Objective**: Two executions buying the same symbol in the same tick both reach the
/// ledger, in the order their decisions were enqueued.
#[tokio::test]
async fn test_concurrent_executions_fill_in_enqueue_order() {
    let (system, _broker) = create_test_system(create_test_config());

    let first = system.start_execution(ExecutionRequest::new("buy_once", "alice", vec!["AAA".into()]));
    let second = system.start_execution(ExecutionRequest::new("buy_once", "bob", vec!["AAA".into()]));
    assert!(first.success && second.success, "{} / {}", first.message, second.message);
    let ids: HashSet<ExecutionId> = [execution_id_of(&first), execution_id_of(&second)].into_iter().collect();

    let ledger = system.pipeline().ledger().clone();
    eventually("two fills", || ledger.len() == 2).await;

    let records = ledger.records();
    assert!(
        records[0].order_sequence < records[1].order_sequence,
        "Ledger must follow enqueue order"
    );
    assert_eq!(records[0].index + 1, records[1].index);
    let origins: HashSet<ExecutionId> = records
        .iter()
        .map(|r| match r.origin {
            OrderOrigin::Execution(id) => id,
            other => panic!("unexpected origin {}", other),
        })
        .collect();
    assert_eq!(origins, ids, "Each execution's order must be filled exactly once");

    let position = system.portfolio().position("AAA").expect("position opened");
    assert!((position.quantity - 20.0).abs() < 1e-9);

    system.shutdown().await;
}

#[tokio::test]
async fn test_unknown_strategy_and_execution_lifecycle() {
    let (system, _broker) = create_test_system(create_test_config());

    let unknown = system.start_execution(ExecutionRequest::new("nope", "alice", vec!["AAA".into()]));
    assert!(!unknown.success);
    assert!(!system.get_status(ExecutionId::new()).success);

    let started = system.start_execution(ExecutionRequest::new("buy_once", "alice", vec!["BBB".into()]));
    let id = execution_id_of(&started);
    assert!(system.get_status(id).success);

    let stopped = system.stop_execution(id).await;
    assert!(stopped.success, "{}", stopped.message);
    assert!(stopped.message.contains("STOPPED"), "{}", stopped.message);
    assert!(!system.stop_execution(id).await.success, "Second stop must fail");

    let list = system.list_executions();
    assert_eq!(list.data.unwrap().as_array().unwrap().len(), 1);

    system.shutdown().await;
}

/// **Objective**: Signals, fills, execution status and strategy definitions all reach the
/// persistence boundary and come back from `query_latest`.
#[tokio::test]
async fn test_routed_activity_is_persisted() {
    let (system, _broker) = create_test_system(create_test_config());

    let strategies = system.query_strategies(&QueryFilter::default());
    assert!(strategies.iter().any(|s| s.name == "buy_once"), "Registry recorded at startup");

    let started = system.start_execution(ExecutionRequest::new("buy_once", "alice", vec!["AAA".into()]));
    let id = execution_id_of(&started);
    let executions = system.query_executions(&QueryFilter::latest(10).with_owner("alice"));
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].id, id);

    eventually("fill persisted", || !system.query_fills(&QueryFilter::latest(10)).is_empty()).await;
    let fills = system.query_fills(&QueryFilter::latest(10));
    let ledger = system.pipeline().ledger().records();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].id, ledger[0].fill.id);

    let signals = system.query_signals(&QueryFilter::latest(10).with_owner(id.to_string()));
    assert_eq!(signals.len(), 1, "The buy is recorded against its execution");
    assert_eq!(signals[0].symbol, "AAA");

    assert!(system.stop_execution(id).await.success);
    let stopped = system.query_executions(&QueryFilter::latest(1));
    assert_eq!(stopped[0].state, ExecutionState::Stopped, "Stop overwrites the started record");
    assert_eq!(system.query_executions(&QueryFilter::default()).len(), 1);

    system.shutdown().await;
}

// --- Manual orders ---

/// **Objective**: A manual order is validated, filled through the pipeline, applied to
/// the book and persisted with its final state.
#[tokio::test]
async fn test_manual_order_flow() {
    let (system, _broker) = create_test_system(create_test_config());

    let invalid = system
        .submit_manual_order(OrderRequest::market("AAA", Side::Buy, 0.0, OrderOrigin::Manual))
        .await;
    assert!(!invalid.success, "Zero quantity must be refused");

    // Origin is forced to manual whatever the caller sent.
    let response = system
        .submit_manual_order(OrderRequest::market("AAA", Side::Buy, 10.0, OrderOrigin::Rebalancer))
        .await;
    assert!(response.success, "{}", response.message);
    let id = order_id_of(&response);

    eventually("manual order filled", || {
        system.pipeline().get_order(&id).map(|o| o.state()) == Some(OrderState::Filled)
    })
    .await;
    assert_eq!(system.pipeline().get_order(&id).unwrap().origin(), OrderOrigin::Manual);

    let portfolio = system.portfolio();
    assert!((portfolio.position("AAA").unwrap().quantity - 10.0).abs() < 1e-9);
    assert!(
        (portfolio.cash() - (100_000.0 - 1_000.0 - 1.0)).abs() < 1e-6,
        "Cash must drop by notional plus fees, got {}",
        portfolio.cash()
    );

    eventually("order persisted as filled", || {
        system
            .query_orders(&QueryFilter::latest(10).with_owner("manual"))
            .iter()
            .any(|o| o.id() == id && o.state() == OrderState::Filled)
    })
    .await;

    system.shutdown().await;
}

#[tokio::test]
async fn test_cancel_resting_order() {
    let (system, _broker) = create_test_system(create_test_config());

    let response = system
        .submit_manual_order(OrderRequest::limit("AAA", Side::Buy, 5.0, 90.0, OrderOrigin::Manual))
        .await;
    let id = order_id_of(&response);
    eventually("order resting at the broker", || {
        system
            .pipeline()
            .working_orders()
            .iter()
            .any(|o| o.id() == id)
    })
    .await;

    let cancelled = system.cancel_order(id).await;
    assert!(cancelled.success, "{}", cancelled.message);
    assert_eq!(system.pipeline().get_order(&id).unwrap().state(), OrderState::Cancelled);

    let again = system.cancel_order(id).await;
    assert!(!again.success, "A cancelled order cannot be cancelled again");
    assert!(!system.get_order(OrderId::new()).success);

    system.shutdown().await;
}

// --- Rebalancing ---

/// **Objective**: A triggered rebalance submits its orders through the pipeline with the
/// rebalancer origin, and reports completion on the event bus.
#[tokio::test]
async fn test_rebalance_goes_through_pipeline() {
    let mut config = create_test_config();
    config.portfolio = config
        .portfolio
        .clone()
        .with_target("AAA", 0.5)
        .with_target("BBB", 0.5);
    let (system, _broker) = create_test_system(config);
    let mut events = system.subscribe();

    eventually("marks for both symbols", || {
        system.portfolio().price("AAA").is_some() && system.portfolio().price("BBB").is_some()
    })
    .await;

    let response = system.trigger_rebalance().await;
    assert!(response.success, "{}", response.message);
    let submitted = response.data.unwrap()["submitted"].as_array().unwrap().len();
    assert_eq!(submitted, 2);

    let ledger = system.pipeline().ledger().clone();
    eventually("rebalance fills", || ledger.len() == 2).await;
    assert!(ledger
        .records()
        .iter()
        .all(|r| r.origin == OrderOrigin::Rebalancer));

    // 0.5 target less the 5% cash buffer.
    let portfolio = system.portfolio();
    assert!((portfolio.position("AAA").unwrap().quantity - 475.0).abs() < 1e-9);
    assert!((portfolio.position("BBB").unwrap().quantity - 950.0).abs() < 1e-9);
    assert!(system.rebalancer().last_rebalanced().is_some());

    let completed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(SystemEvent::RebalanceCompleted { orders, .. }) = events.recv().await {
                return orders;
            }
        }
    })
    .await
    .expect("rebalance completion event");
    assert_eq!(completed, 2);

    system.shutdown().await;
}

/// **Objective**: Abandoning a rebalance call midway through its submissions still returns
/// the rebalancer to IDLE, so the next attempt can run.
#[tokio::test]
async fn test_dropped_rebalance_call_still_finishes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = create_test_config();
    config.execution.broker_timeout_ms = 100;
    config.portfolio = config
        .portfolio
        .clone()
        .with_target("AAA", 0.5)
        .with_target("BBB", 0.5);
    let broker = Arc::new(StallingBroker {
        inner: create_test_broker(),
        stalled: AtomicBool::new(false),
    });
    let feed = Arc::new(QuoteFeed::new(broker.clone()));
    let system = TradingSystem::builder(config, broker.clone(), feed)
        .registry(create_test_registry())
        .start();

    eventually("marks for both symbols", || {
        system.portfolio().price("AAA").is_some() && system.portfolio().price("BBB").is_some()
    })
    .await;

    broker.stalled.store(true, Ordering::SeqCst);
    let abandoned = tokio::time::timeout(Duration::from_millis(20), system.trigger_rebalance()).await;
    assert!(abandoned.is_err(), "Submission should still be waiting on the broker");

    let rebalancer = system.rebalancer().clone();
    eventually("rebalancer back to idle", || rebalancer.state() == RebalanceState::Idle).await;
    assert!(
        rebalancer.last_rebalanced().is_none(),
        "Nothing was submitted, so no rebalance is recorded"
    );

    broker.stalled.store(false, Ordering::SeqCst);
    let response = system.trigger_rebalance().await;
    assert!(response.success, "{}", response.message);
    assert_eq!(response.data.unwrap()["submitted"].as_array().unwrap().len(), 2);

    system.shutdown().await;
}

// --- Backtesting ---

/// **Objective**: A backtest replays history through the registered strategy and the risk
/// gate on its own paper book, leaving the live book and ledger untouched.
#[tokio::test]
async fn test_backtest_leaves_live_book_alone() {
    let (system, _broker) = create_test_system(create_test_config());
    let start = chrono::Utc::now() - chrono::Duration::days(10);
    let history: Vec<MarketSnapshot> = [100.0, 104.0, 98.0, 110.0]
        .iter()
        .enumerate()
        .map(|(i, p)| MarketSnapshot::new(start + chrono::Duration::days(i as i64)).with_quote("AAA", *p, 1_000.0))
        .collect();

    let response = system.run_backtest(ExecutionRequest::new("buy_once", "research", vec!["AAA".into()]), &history);
    assert!(response.success, "{}", response.message);
    let report: BacktestReport = serde_json::from_value(response.data.unwrap()).unwrap();
    assert_eq!(report.steps, 4);
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].timestamp, start);
    assert!((report.trades[0].quantity - 10.0).abs() < 1e-9);
    assert!(report.final_value > report.initial_value, "10 units bought at 100 now marked at 110");
    assert_eq!(report.equity_curve.len(), 4);

    assert!(system.portfolio().position("AAA").is_none());
    assert_eq!(system.pipeline().ledger().len(), 0);

    let empty = system.run_backtest(ExecutionRequest::new("buy_once", "research", vec!["AAA".into()]), &[]);
    assert!(!empty.success);

    system.shutdown().await;
}

// --- Health and shutdown ---

#[tokio::test]
async fn test_health_check_reports_broker_outage() {
    let (system, broker) = create_test_system(create_test_config());

    let healthy = health_of(&system.health_check().await);
    assert_eq!(healthy.status, HealthStatus::Healthy);
    assert!(healthy.issues.is_empty());

    broker.set_connected(false);
    let report = health_of(&system.health_check().await);
    assert_eq!(report.status, HealthStatus::Critical);
    assert!(!report.broker_connected);
    assert!(report.issues.iter().any(|i| i.contains("broker disconnected")));

    let refused = system
        .submit_manual_order(OrderRequest::market("AAA", Side::Buy, 1.0, OrderOrigin::Manual))
        .await;
    assert!(!refused.success, "Orders must be refused while disconnected");

    system.shutdown().await;
}

/// **Objective**: Shutdown drains the pipeline, saves history to the data directory and is
/// idempotent.
#[tokio::test]
async fn test_shutdown_saves_state() {
    let dir = std::env::temp_dir().join(format!("trading-system-{}", std::process::id()));
    let mut config = create_test_config();
    config.system.data_dir = Some(dir.clone());
    let (system, _broker) = create_test_system(config);

    let response = system
        .submit_manual_order(OrderRequest::market("BBB", Side::Buy, 4.0, OrderOrigin::Manual))
        .await;
    let id = order_id_of(&response);

    let stopped = system.shutdown().await;
    assert!(stopped.success, "{}", stopped.message);
    assert!(
        system.pipeline().get_order(&id).unwrap().is_terminal(),
        "Queued orders must be resolved before shutdown returns"
    );
    assert!(dir.join("portfolio_history.json").exists());
    assert!(dir.join("execution_ledger.json").exists());

    let again = system.shutdown().await;
    assert!(again.message.contains("already"));
    let report = system.health().await;
    assert_eq!(report.status, HealthStatus::Critical, "Pipeline is stopped");

    std::fs::remove_dir_all(&dir).ok();
}
