use super::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trading::{
    Direction, ExecutionId, ExecutionState, MarketDataFeed, MarketSnapshot, PortfolioView,
    Position, Result, Signal, TradingError,
};

// --- Mocks ---

struct StaticFeed {
    price: f64,
    calls: AtomicUsize,
}

impl StaticFeed {
    fn new(price: f64) -> Self {
        Self {
            price,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MarketDataFeed for StaticFeed {
    async fn snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = MarketSnapshot::new(Utc::now());
        for symbol in symbols {
            snapshot = snapshot.with_quote(symbol, self.price + n as f64, 1_000.0);
        }
        Ok(snapshot)
    }
}

#[derive(Default)]
struct RecordingSink {
    routed: Mutex<Vec<(ExecutionId, Signal)>>,
}

impl RecordingSink {
    fn signals(&self) -> Vec<(ExecutionId, Signal)> {
        self.routed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn route(&self, ctx: &ExecutionContext, envelope: SignalEnvelope) -> Result<Routing> {
        self.routed.lock().unwrap().push((ctx.id(), envelope.signal));
        Ok(Routing::Declined("recorded".into()))
    }
}

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

#[derive(Clone, Default)]
struct HookCounter {
    cleanups: Arc<AtomicUsize>,
}

/// Emits one BUY per symbol each tick. Misbehaves on demand.
struct ScriptedStrategy {
    hooks: HookCounter,
    fail_init: bool,
    fail_odd_iterations: bool,
    panic_always: bool,
    panic_on_sizing: bool,
    exit_everything: bool,
    extra_hold: bool,
}

impl ScriptedStrategy {
    fn new(hooks: HookCounter) -> Self {
        Self {
            hooks,
            fail_init: false,
            fail_odd_iterations: false,
            panic_always: false,
            panic_on_sizing: false,
            exit_everything: false,
            extra_hold: false,
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn initialize(&mut self, _ctx: &ExecutionContext) -> Result<()> {
        if self.fail_init {
            return Err(TradingError::validation("bad warm-up data"));
        }
        Ok(())
    }

    fn generate_signals(
        &mut self,
        ctx: &ExecutionContext,
        snapshot: &MarketSnapshot,
    ) -> Result<Vec<Signal>> {
        if self.panic_always {
            panic!("indicator blew up");
        }
        if self.fail_odd_iterations && ctx.iteration() % 2 == 1 {
            return Err(TradingError::validation("odd iteration"));
        }
        let mut signals: Vec<Signal> = ctx
            .symbols()
            .iter()
            .filter(|_| !self.exit_everything)
            .filter_map(|s| snapshot.price(s).map(|p| Signal::buy(s, p, snapshot.timestamp)))
            .collect();
        if self.extra_hold {
            signals.push(Signal::new("HOLDME", Direction::Hold, 1.0, snapshot.timestamp));
        }
        Ok(signals)
    }

    fn should_exit(&self, _position: &Position, _price: f64, _ctx: &ExecutionContext) -> bool {
        self.exit_everything
    }

    fn size_position(&self, _signal: &Signal, _ctx: &ExecutionContext) -> Option<f64> {
        if self.panic_on_sizing {
            panic!("sizing blew up");
        }
        None
    }

    fn cleanup(&mut self, _ctx: &ExecutionContext) {
        self.hooks.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        tick_interval_ms: 10,
        error_backoff_ms: 5,
        max_backoff_ms: 20,
        history_size: 50,
    }
}

fn registry_with(name: &str, build: impl Fn() -> ScriptedStrategy + Send + Sync + 'static) -> Arc<StrategyRegistry> {
    let registry = Arc::new(StrategyRegistry::new());
    registry.register(
        StrategyDefinition::new(name, "test strategy", move |_params| {
            Ok(Box::new(build()) as Box<dyn Strategy>)
        })
        .with_parameter(ParameterSpec::new("window", "lookback", 20i64).with_range(2.0, 200.0)),
    );
    registry
}

fn create_test_manager(
    registry: Arc<StrategyRegistry>,
    sink: Arc<RecordingSink>,
    portfolio: StaticPortfolio,
) -> ExecutionManager {
    ExecutionManager::new(
        registry,
        Arc::new(StaticFeed::new(100.0)),
        sink,
        Arc::new(portfolio),
        fast_config(),
    )
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

// --- Registry & parameters ---

#[test]
fn test_register_overwrites_and_lookup_reports_missing() {
    let registry = StrategyRegistry::new();
    let def = || StrategyDefinition::new("alpha", "first", |_| Err(TradingError::validation("unused")));

    assert!(!registry.register(def()), "First registration should not replace");
    assert!(registry.register(def()), "Second registration should overwrite");
    assert_eq!(registry.len(), 1);

    assert!(registry.lookup("alpha").is_some());
    assert!(registry.lookup("beta").is_none());

    assert!(registry.unregister("alpha"));
    assert!(!registry.unregister("alpha"));
    assert!(registry.lookup("alpha").is_none());
}

#[test]
fn test_schema_resolution() {
    let schema = ParameterSchema::new()
        .with(ParameterSpec::new("short_window", "fast SMA", 20i64).with_range(2.0, 100.0))
        .with(ParameterSpec::new("threshold", "momentum threshold", 0.02));

    let defaults = schema.resolve(&HashMap::new()).unwrap();
    assert_eq!(defaults.usize_or("short_window", 0), 20);
    assert!((defaults.f64_or("threshold", 0.0) - 0.02).abs() < 1e-12);

    let mut supplied = HashMap::new();
    supplied.insert("threshold".to_string(), ParameterValue::Integer(1));
    let resolved = schema.resolve(&supplied).unwrap();
    assert!((resolved.f64_or("threshold", 0.0) - 1.0).abs() < 1e-12, "Integers are accepted for floats");

    let mut out_of_range = HashMap::new();
    out_of_range.insert("short_window".to_string(), ParameterValue::Integer(500));
    assert!(matches!(schema.resolve(&out_of_range), Err(TradingError::Validation(_))));

    let mut wrong_type = HashMap::new();
    wrong_type.insert("short_window".to_string(), ParameterValue::String("x".into()));
    assert!(schema.resolve(&wrong_type).is_err());

    let mut unknown = HashMap::new();
    unknown.insert("nope".to_string(), ParameterValue::Boolean(true));
    assert!(schema.resolve(&unknown).is_err());
}

#[test]
fn test_backoff_is_bounded() {
    let config = RuntimeConfig {
        tick_interval_ms: 1_000,
        error_backoff_ms: 100,
        max_backoff_ms: 300,
        history_size: 10,
    };
    assert_eq!(config.backoff(1), Duration::from_millis(100));
    assert_eq!(config.backoff(2), Duration::from_millis(200));
    assert_eq!(config.backoff(3), Duration::from_millis(300));
    assert_eq!(config.backoff(40), Duration::from_millis(300));
}

#[test]
fn test_price_history_stats() {
    let mut history = PriceHistory::new(100);
    let now = Utc::now();
    for i in 0..20 {
        let price = if i % 2 == 0 { 100.0 } else { 102.0 };
        history.record(&MarketSnapshot::new(now).with_quote("A", price, 1.0));
    }
    let stats = history.stats("A");
    assert!(stats.volatility.unwrap() > 0.0);
    assert!((stats.atr.unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(history.stats("MISSING"), SymbolStats::default());
}

// --- Runtime ---

#[tokio::test]
async fn test_start_unknown_strategy_is_rejected() {
    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(Arc::new(StrategyRegistry::new()), sink, StaticPortfolio::default());

    let result = manager.start(ExecutionRequest::new("ghost", "alice", vec!["A".into()]));
    assert!(matches!(result, Err(TradingError::Validation(_))));

    let registry = registry_with("scripted", || ScriptedStrategy::new(HookCounter::default()));
    let manager = create_test_manager(registry, Arc::new(RecordingSink::default()), StaticPortfolio::default());
    let bad = ExecutionRequest::new("scripted", "alice", vec!["A".into()]).with_parameter("window", 1_000i64);
    assert!(manager.start(bad).is_err(), "Out-of-range parameter must be rejected");
}

#[tokio::test]
async fn test_signals_routed_in_generation_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = Arc::new(RecordingSink::default());
    let registry = registry_with("scripted", || {
        let mut s = ScriptedStrategy::new(HookCounter::default());
        s.extra_hold = true;
        s
    });
    let manager = create_test_manager(registry, sink.clone(), StaticPortfolio::default());

    let id = manager
        .start(ExecutionRequest::new(
            "scripted",
            "alice",
            vec!["A".into(), "B".into(), "C".into()],
        ))
        .unwrap();

    wait_for(|| sink.signals().len() >= 6).await;
    manager.stop(id).await.unwrap();

    let routed = sink.signals();
    let symbols: Vec<&str> = routed.iter().take(6).map(|(_, s)| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["A", "B", "C", "A", "B", "C"]);
    assert!(routed.iter().all(|(exec, s)| *exec == id && s.execution_id == Some(id)));
    assert!(
        routed.iter().all(|(_, s)| s.direction != Direction::Hold),
        "HOLD signals must never reach the sink"
    );
}

#[tokio::test]
async fn test_stop_runs_cleanup_exactly_once() {
    let hooks = HookCounter::default();
    let sink = Arc::new(RecordingSink::default());
    let p = hooks.clone();
    let registry = registry_with("scripted", move || ScriptedStrategy::new(p.clone()));
    let manager = create_test_manager(registry, sink, StaticPortfolio::default());

    let id = manager
        .start(ExecutionRequest::new("scripted", "alice", vec!["A".into()]))
        .unwrap();
    wait_for(|| manager.status(id).map(|s| s.iterations >= 2).unwrap_or(false)).await;
    assert_eq!(manager.state(id), Some(ExecutionState::Running));

    let final_state = manager.stop(id).await.unwrap();
    assert_eq!(final_state, ExecutionState::Stopped);
    assert_eq!(manager.state(id), Some(ExecutionState::Stopped));
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);

    assert!(manager.stop(id).await.is_err(), "Second stop should be refused");
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initialize_failure_moves_to_error() {
    let hooks = HookCounter::default();
    let p = hooks.clone();
    let registry = registry_with("broken", move || {
        let mut s = ScriptedStrategy::new(p.clone());
        s.fail_init = true;
        s
    });
    let manager = create_test_manager(registry, Arc::new(RecordingSink::default()), StaticPortfolio::default());

    let id = manager
        .start(ExecutionRequest::new("broken", "alice", vec!["A".into()]))
        .unwrap();
    wait_for(|| manager.state(id) == Some(ExecutionState::Error)).await;

    let status = manager.status(id).unwrap();
    assert!(status.last_error.unwrap().contains("bad warm-up data"));
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 0);
    assert_eq!(manager.stop(id).await.unwrap(), ExecutionState::Error);
}

#[tokio::test]
async fn test_faults_are_isolated_and_loop_continues() {
    let registry = Arc::new(StrategyRegistry::new());
    registry.register(StrategyDefinition::new("flaky", "fails on odd ticks", |_| {
        let mut s = ScriptedStrategy::new(HookCounter::default());
        s.fail_odd_iterations = true;
        Ok(Box::new(s) as Box<dyn Strategy>)
    }));
    registry.register(StrategyDefinition::new("panicky", "always panics", |_| {
        let mut s = ScriptedStrategy::new(HookCounter::default());
        s.panic_always = true;
        Ok(Box::new(s) as Box<dyn Strategy>)
    }));
    registry.register(StrategyDefinition::new("healthy", "never fails", |_| {
        Ok(Box::new(ScriptedStrategy::new(HookCounter::default())) as Box<dyn Strategy>)
    }));

    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(registry, sink, StaticPortfolio::default());
    let flaky = manager.start(ExecutionRequest::new("flaky", "a", vec!["A".into()])).unwrap();
    let panicky = manager.start(ExecutionRequest::new("panicky", "b", vec!["B".into()])).unwrap();
    let healthy = manager.start(ExecutionRequest::new("healthy", "c", vec!["C".into()])).unwrap();

    wait_for(|| {
        let f = manager.status(flaky).unwrap();
        let p = manager.status(panicky).unwrap();
        let h = manager.status(healthy).unwrap();
        f.faults >= 2 && f.iterations >= 2 && p.faults >= 2 && h.iterations >= 3
    })
    .await;

    assert_eq!(manager.state(panicky), Some(ExecutionState::Running));
    assert!(manager
        .status(panicky)
        .unwrap()
        .last_error
        .unwrap()
        .contains("indicator blew up"));
    assert_eq!(manager.status(healthy).unwrap().faults, 0);
    assert_eq!(manager.active_count(), 3);

    manager.stop_all().await;
    assert_eq!(manager.active_count(), 0);
    assert!(manager.list().iter().all(|s| s.state == ExecutionState::Stopped));
}

/// **Objective**: A panic in `size_position` is a fault of that tick only: nothing is
/// routed, the loop keeps running and `stop` still runs cleanup once.
#[tokio::test]
async fn test_sizing_panic_is_isolated() {
    let hooks = HookCounter::default();
    let h = hooks.clone();
    let registry = registry_with("bad_sizer", move || {
        let mut s = ScriptedStrategy::new(h.clone());
        s.panic_on_sizing = true;
        s
    });
    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(registry, sink.clone(), StaticPortfolio::default());

    let id = manager
        .start(ExecutionRequest::new("bad_sizer", "alice", vec!["A".into()]))
        .unwrap();
    wait_for(|| manager.status(id).map(|s| s.faults >= 2).unwrap_or(false)).await;

    assert_eq!(manager.state(id), Some(ExecutionState::Running));
    let status = manager.status(id).unwrap();
    assert!(status.last_error.unwrap().contains("sizing blew up"));
    assert_eq!(status.iterations, 0, "A faulted tick is not counted as an iteration");
    assert!(sink.signals().is_empty(), "Nothing is routed from a faulted tick");

    assert_eq!(manager.stop(id).await.unwrap(), ExecutionState::Stopped);
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_should_exit_emits_sell() {
    let mut position = Position::new("A", 100.0, Utc::now());
    position.quantity = 10.0;
    position.average_entry_price = 90.0;
    let portfolio = StaticPortfolio {
        positions: vec![position],
    };

    let registry = registry_with("exiter", || {
        let mut s = ScriptedStrategy::new(HookCounter::default());
        s.exit_everything = true;
        s
    });
    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(registry, sink.clone(), portfolio);

    let id = manager
        .start(ExecutionRequest::new("exiter", "alice", vec!["A".into(), "B".into()]))
        .unwrap();
    wait_for(|| !sink.signals().is_empty()).await;
    manager.stop(id).await.unwrap();

    let (_, signal) = &sink.signals()[0];
    assert_eq!(signal.symbol, "A");
    assert_eq!(signal.direction, Direction::Sell);
    assert_eq!(signal.rationale, "exit condition met");
    assert!(sink.signals().iter().all(|(_, s)| s.symbol == "A"), "B has no position to exit");
}

// --- Replay ---

/// **Objective**: A replayed execution sees the recorded timestamps as its clock, keeps
/// going after a faulted tick and cleans up once.
#[test]
fn test_replay_runs_on_snapshot_time() {
    let hooks = HookCounter::default();
    let counter = hooks.clone();
    let registry = registry_with("scripted", move || {
        let mut s = ScriptedStrategy::new(counter.clone());
        s.fail_odd_iterations = true;
        s
    });
    let (context, strategy) = registry
        .instantiate(&ExecutionRequest::new("scripted", "alice", vec!["A".into()]))
        .unwrap();
    let id = context.id();
    let mut replay = ReplayRunner::new(context, strategy, 10);
    let portfolio = StaticPortfolio::default();

    let start = Utc::now() - chrono::Duration::days(30);
    let day = |n: i64| MarketSnapshot::new(start + chrono::Duration::days(n)).with_quote("A", 100.0 + n as f64, 1_000.0);

    replay.initialize(&day(0), &portfolio).unwrap();
    assert_eq!(replay.context().now(), start);

    let faulted = replay.step(&day(0), &portfolio);
    assert!(matches!(faulted, Err(TradingError::StrategyFault { .. })));

    let envelopes = replay.step(&day(1), &portfolio).unwrap();
    assert_eq!(replay.context().now(), start + chrono::Duration::days(1));
    assert_eq!(replay.context().iteration(), 2);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].signal.timestamp, start + chrono::Duration::days(1));
    assert_eq!(envelopes[0].signal.execution_id, Some(id));

    let context = replay.finish();
    assert_eq!(context.id(), id);
    assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_instantiate_rejects_empty_symbols() {
    let registry = registry_with("scripted", || ScriptedStrategy::new(HookCounter::default()));
    let result = registry.instantiate(&ExecutionRequest::new("scripted", "alice", Vec::new()));
    assert!(matches!(result, Err(TradingError::Validation(_))));
}
