use crate::backtest::Backtester;
use crate::config::AppConfig;
use crate::event_bus::{EventBus, SystemError, SystemEvent};
use crate::monitor::{FillListener, RebalanceLoop, SnapshotLoop, Watchlist};
use crate::rebalance::RebalanceDriver;
use crate::router::RiskRouter;
use chrono::{DateTime, Utc};
use execution_engine::{ExecutionPipeline, HistoryFilter, Order, QueueStatus};
use log::{info, warn};
use portfolio_manager::{
    PerformanceSummary, PortfolioSnapshot, PortfolioState, RebalanceState, Rebalancer,
};
use risk_manager::RiskGate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use trading::{
    BrokerGateway, Entity, ExecutionId, ExecutionState, Fill, MarketDataFeed, MarketSnapshot,
    OrderId, OrderOrigin, OrderRequest, QueryFilter, Repository, ServiceResponse, Signal,
};
use trading_core::framework::{
    ExecutionManager, ExecutionRequest, ExecutionStatus, StrategyInfo, StrategyRegistry,
};
use trading_core::fs::StateStore;
use trading_core::repository::InMemoryRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub broker_connected: bool,
    pub pipeline_running: bool,
    pub active_alerts: usize,
    pub hard_breach: Option<String>,
    pub active_executions: usize,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceStatus {
    pub state: RebalanceState,
    pub auto_rebalance: bool,
    pub last_rebalanced: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub snapshot: PortfolioSnapshot,
    pub performance: PerformanceSummary,
    pub rebalance: RebalanceStatus,
    pub halt_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub strategies: Vec<String>,
    pub executions_total: usize,
    pub executions_active: usize,
    pub queue: QueueStatus,
    pub ledger_entries: usize,
    pub total_value: f64,
    pub cash: f64,
    pub positions: usize,
    pub rebalance: RebalanceStatus,
    pub active_alerts: usize,
    pub halted: bool,
}

/// Collaborators of a [`TradingSystem`] that may be swapped before it starts.
pub struct SystemBuilder {
    config: AppConfig,
    broker: Arc<dyn BrokerGateway>,
    feed: Arc<dyn MarketDataFeed>,
    registry: Option<Arc<StrategyRegistry>>,
    orders: Option<Arc<dyn Repository<Order>>>,
    snapshots: Option<Arc<dyn Repository<PortfolioSnapshot>>>,
    signals: Option<Arc<dyn Repository<Signal>>>,
    fills: Option<Arc<dyn Repository<Fill>>>,
    execution_records: Option<Arc<dyn Repository<ExecutionStatus>>>,
    strategies: Option<Arc<dyn Repository<StrategyInfo>>>,
}

/// Uses the given repository, or an unbounded in-memory one.
fn or_in_memory<T: Entity>(repository: Option<Arc<dyn Repository<T>>>) -> Arc<dyn Repository<T>> {
    match repository {
        Some(repository) => repository,
        None => Arc::new(InMemoryRepository::new()),
    }
}

impl SystemBuilder {
    /// Replaces the built-in strategy set.
    pub fn registry(mut self, registry: Arc<StrategyRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn orders(mut self, orders: Arc<dyn Repository<Order>>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn snapshots(mut self, snapshots: Arc<dyn Repository<PortfolioSnapshot>>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Receives every signal routed to the risk gate.
    pub fn signals(mut self, signals: Arc<dyn Repository<Signal>>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn fills(mut self, fills: Arc<dyn Repository<Fill>>) -> Self {
        self.fills = Some(fills);
        self
    }

    /// Receives execution status on start, stop and shutdown.
    pub fn execution_records(mut self, records: Arc<dyn Repository<ExecutionStatus>>) -> Self {
        self.execution_records = Some(records);
        self
    }

    /// Receives the registered strategy definitions at startup.
    pub fn strategies(mut self, strategies: Arc<dyn Repository<StrategyInfo>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Wires the services and spawns the pipeline worker and background loops.
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> TradingSystem {
        let SystemBuilder {
            config,
            broker,
            feed,
            registry,
            orders,
            snapshots,
            signals,
            fills,
            execution_records,
            strategies,
        } = self;

        let registry = registry.unwrap_or_else(|| {
            let registry = StrategyRegistry::new();
            strategy_lab::register_builtin(&registry);
            Arc::new(registry)
        });
        let orders = or_in_memory(orders);
        let signals = or_in_memory(signals);
        let fills = or_in_memory(fills);
        let execution_records = or_in_memory(execution_records);
        let strategies = or_in_memory(strategies);
        for info in registry.infos() {
            let name = info.name.clone();
            if let Err(e) = strategies.save(info) {
                warn!("Strategy '{}' not persisted: {}", name, e);
            }
        }
        let snapshots: Arc<dyn Repository<PortfolioSnapshot>> = match snapshots {
            Some(snapshots) => snapshots,
            None => Arc::new(InMemoryRepository::with_capacity(config.portfolio.history_limit)),
        };

        let bus = EventBus::new();
        let portfolio = Arc::new(PortfolioState::new(config.portfolio.clone()));
        let rebalancer = Arc::new(Rebalancer::new(config.portfolio.clone()));
        let gate = Arc::new(RiskGate::new(config.risk.clone()).with_sectors(config.portfolio.sectors.clone()));
        let pipeline = Arc::new(ExecutionPipeline::start(
            config.execution.clone(),
            broker.clone(),
            portfolio.clone(),
        ));
        let router = Arc::new(RiskRouter::new(
            gate.clone(),
            portfolio.clone(),
            pipeline.clone(),
            signals.clone(),
        ));
        let executions = ExecutionManager::new(
            registry,
            feed,
            router,
            portfolio.clone(),
            config.strategy.clone(),
        );
        let driver = Arc::new(RebalanceDriver::new(
            rebalancer.clone(),
            portfolio.clone(),
            pipeline.clone(),
            bus.clone(),
        ));
        let watchlist = Arc::new(Watchlist::new(config.watchlist()));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let trigger = Arc::new(Notify::new());
        let tasks = vec![
            tokio::spawn(
                FillListener {
                    events: pipeline.subscribe(),
                    pipeline: pipeline.clone(),
                    orders: orders.clone(),
                    fills: fills.clone(),
                    bus: bus.clone(),
                    rebalance_trigger: trigger.clone(),
                }
                .run(shutdown_rx.clone()),
            ),
            tokio::spawn(
                SnapshotLoop {
                    broker: broker.clone(),
                    pipeline: pipeline.clone(),
                    portfolio: portfolio.clone(),
                    gate: gate.clone(),
                    snapshots: snapshots.clone(),
                    watchlist: watchlist.clone(),
                    bus: bus.clone(),
                    interval: config.system.snapshot_interval(),
                    broker_timeout: config.execution.broker_timeout(),
                }
                .run(shutdown_rx.clone()),
            ),
            tokio::spawn(
                RebalanceLoop {
                    driver: driver.clone(),
                    trigger,
                    interval: config.system.rebalance_check_interval(),
                }
                .run(shutdown_rx),
            ),
        ];

        info!(
            "Trading system started: cash {:.2}, {} strategies registered, auto-rebalance {}",
            config.portfolio.initial_cash,
            executions.registry().len(),
            rebalancer.is_auto_enabled()
        );

        TradingSystem {
            config,
            broker,
            portfolio,
            rebalancer,
            gate,
            pipeline,
            executions,
            driver,
            watchlist,
            orders,
            snapshots,
            signals,
            fills,
            execution_records,
            strategies,
            bus,
            shutdown,
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }
}

/// The running system: one instance of every service, wired once at startup.
///
/// Every user-facing operation returns a [`ServiceResponse`]; failures become
/// `success: false` with the error message, never a panic or a raw error.
pub struct TradingSystem {
    config: AppConfig,
    broker: Arc<dyn BrokerGateway>,
    portfolio: Arc<PortfolioState>,
    rebalancer: Arc<Rebalancer>,
    gate: Arc<RiskGate>,
    pipeline: Arc<ExecutionPipeline>,
    executions: ExecutionManager,
    driver: Arc<RebalanceDriver>,
    watchlist: Arc<Watchlist>,
    orders: Arc<dyn Repository<Order>>,
    snapshots: Arc<dyn Repository<PortfolioSnapshot>>,
    signals: Arc<dyn Repository<Signal>>,
    fills: Arc<dyn Repository<Fill>>,
    execution_records: Arc<dyn Repository<ExecutionStatus>>,
    strategies: Arc<dyn Repository<StrategyInfo>>,
    bus: EventBus,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
    started_at: DateTime<Utc>,
}

impl TradingSystem {
    pub fn builder(config: AppConfig, broker: Arc<dyn BrokerGateway>, feed: Arc<dyn MarketDataFeed>) -> SystemBuilder {
        SystemBuilder {
            config,
            broker,
            feed,
            registry: None,
            orders: None,
            snapshots: None,
            signals: None,
            fills: None,
            execution_records: None,
            strategies: None,
        }
    }

    /// Starts the system with the built-in strategies and in-memory repositories.
    pub fn new(config: AppConfig, broker: Arc<dyn BrokerGateway>, feed: Arc<dyn MarketDataFeed>) -> Self {
        Self::builder(config, broker, feed).start()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.bus.subscribe()
    }

    pub fn portfolio(&self) -> &Arc<PortfolioState> {
        &self.portfolio
    }

    pub fn pipeline(&self) -> &Arc<ExecutionPipeline> {
        &self.pipeline
    }

    pub fn gate(&self) -> &Arc<RiskGate> {
        &self.gate
    }

    pub fn rebalancer(&self) -> &Arc<Rebalancer> {
        &self.rebalancer
    }

    // --- Strategy executions ---

    pub fn list_strategies(&self) -> ServiceResponse {
        let infos = self.executions.registry().infos();
        ServiceResponse::ok(format!("{} strategies registered", infos.len())).with_data(&infos)
    }

    pub fn start_execution(&self, request: ExecutionRequest) -> ServiceResponse {
        let symbols = request.symbols.clone();
        let strategy = request.strategy.clone();
        let owner = request.owner.clone();
        match self.executions.start(request) {
            Ok(id) => {
                self.watchlist.extend(symbols);
                self.record_execution(id);
                self.bus.publish(SystemEvent::ExecutionStarted {
                    id,
                    strategy: strategy.clone(),
                    owner,
                });
                ServiceResponse::ok(format!("Execution {} of '{}' started", id, strategy))
                    .with_data(&json!({ "execution_id": id }))
            }
            Err(e) => {
                warn!("Execution of '{}' not started: {}", strategy, e);
                ServiceResponse::fail(e.to_string())
            }
        }
    }

    /// Starts every execution listed in the configuration.
    pub fn start_configured_executions(&self) -> Vec<ServiceResponse> {
        self.config
            .executions
            .iter()
            .cloned()
            .map(|request| self.start_execution(request))
            .collect()
    }

    /// Stops an execution after its current iteration. Orders it already enqueued still
    /// run to a terminal state.
    pub async fn stop_execution(&self, id: ExecutionId) -> ServiceResponse {
        match self.executions.stop(id).await {
            Ok(state) => {
                self.bus.publish(SystemEvent::ExecutionStopped { id, state });
                self.record_execution(id);
                let response = ServiceResponse::ok(format!("Execution {} stopped ({})", id, state));
                match self.executions.status(id) {
                    Some(status) => response.with_data(&status),
                    None => response,
                }
            }
            Err(e) => ServiceResponse::fail(e.to_string()),
        }
    }

    pub fn get_status(&self, id: ExecutionId) -> ServiceResponse {
        match self.executions.status(id) {
            Some(status) => ServiceResponse::ok(format!("Execution {} is {}", id, status.state)).with_data(&status),
            None => ServiceResponse::fail(format!("Execution {} not found", id)),
        }
    }

    pub fn list_executions(&self) -> ServiceResponse {
        let list = self.executions.list();
        ServiceResponse::ok(format!("{} executions", list.len())).with_data(&list)
    }

    fn record_execution(&self, id: ExecutionId) {
        let Some(status) = self.executions.status(id) else {
            return;
        };
        if let Err(e) = self.execution_records.save(status) {
            warn!("Execution {} not persisted: {}", id, e);
            self.bus.publish(SystemEvent::Error {
                error: SystemError::persistence(format!("execution {}: {}", id, e)),
            });
        }
    }

    /// Execution status as last persisted, newest first.
    pub fn query_executions(&self, filter: &QueryFilter) -> Vec<ExecutionStatus> {
        self.execution_records.query_latest(filter)
    }

    /// Strategy definitions recorded at startup.
    pub fn query_strategies(&self, filter: &QueryFilter) -> Vec<StrategyInfo> {
        self.strategies.query_latest(filter)
    }

    /// Signals routed to the risk gate, newest first.
    pub fn query_signals(&self, filter: &QueryFilter) -> Vec<Signal> {
        self.signals.query_latest(filter)
    }

    /// Replays `snapshots` through a fresh instance of the requested strategy on a private
    /// paper book sized by a private risk gate. The live system is not affected.
    pub fn run_backtest(&self, request: ExecutionRequest, snapshots: &[MarketSnapshot]) -> ServiceResponse {
        let backtester = Backtester::new(
            self.executions.registry().clone(),
            self.config.portfolio.clone(),
            self.config.risk.clone(),
            self.config.strategy.clone(),
            self.config.backtest.clone(),
        );
        match backtester.run(&request, snapshots) {
            Ok(report) => ServiceResponse::ok(format!(
                "Backtest of '{}' returned {:.2}% over {} steps",
                report.strategy,
                report.total_return * 100.0,
                report.steps
            ))
            .with_data(&report),
            Err(e) => {
                warn!("Backtest of '{}' failed: {}", request.strategy, e);
                ServiceResponse::fail(e.to_string())
            }
        }
    }

    // --- Portfolio and orders ---

    fn rebalance_status(&self) -> RebalanceStatus {
        RebalanceStatus {
            state: self.rebalancer.state(),
            auto_rebalance: self.rebalancer.is_auto_enabled(),
            last_rebalanced: self.rebalancer.last_rebalanced(),
        }
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            snapshot: self.portfolio.snapshot(),
            performance: self.portfolio.performance(),
            rebalance: self.rebalance_status(),
            halt_reason: self.gate.halt_reason(),
        }
    }

    pub fn get_portfolio_summary(&self) -> ServiceResponse {
        let summary = self.portfolio_summary();
        ServiceResponse::ok(format!(
            "Portfolio value {:.2} ({} positions)",
            summary.snapshot.total_value,
            summary.snapshot.positions.len()
        ))
        .with_data(&summary)
    }

    /// Recorded snapshots from the persistence boundary, newest first.
    pub fn query_snapshots(&self, filter: &QueryFilter) -> Vec<PortfolioSnapshot> {
        self.snapshots.query_latest(filter)
    }

    /// Queues an operator order. It is validated like any other intent but not sized by
    /// the risk gate.
    pub async fn submit_manual_order(&self, request: OrderRequest) -> ServiceResponse {
        let request = OrderRequest {
            origin: OrderOrigin::Manual,
            ..request
        };
        match self.pipeline.submit(request).await {
            Ok(order_id) => {
                ServiceResponse::ok(format!("Order {} queued", order_id)).with_data(&json!({ "order_id": order_id }))
            }
            Err(e) => {
                warn!("Manual order refused: {}", e);
                ServiceResponse::fail(e.to_string())
            }
        }
    }

    pub async fn cancel_order(&self, id: OrderId) -> ServiceResponse {
        match self.pipeline.cancel(id).await {
            Ok(order) => ServiceResponse::ok(format!("Order {} is {}", id, order.state())).with_data(&order),
            Err(e) => ServiceResponse::fail(e.to_string()),
        }
    }

    /// Amends an unresolved order. The order keeps its origin.
    pub async fn modify_order(&self, id: OrderId, request: OrderRequest) -> ServiceResponse {
        let Some(existing) = self.pipeline.get_order(&id) else {
            return ServiceResponse::fail(format!("Order {} not found", id));
        };
        let request = OrderRequest {
            origin: existing.origin(),
            ..request
        };
        match self.pipeline.modify(id, request).await {
            Ok(order) => ServiceResponse::ok(format!("Order {} modified", id)).with_data(&order),
            Err(e) => ServiceResponse::fail(e.to_string()),
        }
    }

    pub fn get_order(&self, id: OrderId) -> ServiceResponse {
        match self.pipeline.get_order(&id) {
            Some(order) => ServiceResponse::ok(format!("Order {} is {}", id, order.state())).with_data(&order),
            None => ServiceResponse::fail(format!("Order {} not found", id)),
        }
    }

    pub fn order_history(&self, filter: &HistoryFilter) -> ServiceResponse {
        let orders = self.pipeline.order_history(filter);
        ServiceResponse::ok(format!("{} orders", orders.len())).with_data(&orders)
    }

    pub fn execution_history(&self, filter: &HistoryFilter) -> ServiceResponse {
        let records = self.pipeline.execution_history(filter);
        ServiceResponse::ok(format!("{} fills", records.len())).with_data(&records)
    }

    /// Orders as last persisted, newest first.
    pub fn query_orders(&self, filter: &QueryFilter) -> Vec<Order> {
        self.orders.query_latest(filter)
    }

    pub fn query_fills(&self, filter: &QueryFilter) -> Vec<Fill> {
        self.fills.query_latest(filter)
    }

    // --- Rebalancing ---

    /// Forces a rebalance now. Its orders go through the execution pipeline.
    pub async fn trigger_rebalance(&self) -> ServiceResponse {
        match self.driver.run(true).await {
            Ok(outcome) => {
                let message = match (&outcome.skipped, outcome.needed) {
                    (Some(reason), _) => format!("Rebalance skipped: {}", reason),
                    (None, false) => "Portfolio already at target weights".to_string(),
                    (None, true) => format!(
                        "Rebalance submitted {} orders ({} refused)",
                        outcome.submitted.len(),
                        outcome.refused.len()
                    ),
                };
                ServiceResponse::ok(message).with_data(&outcome)
            }
            Err(e) => {
                warn!("Rebalance failed: {}", e);
                ServiceResponse::fail(e.to_string())
            }
        }
    }

    pub fn set_auto_rebalance(&self, enabled: bool) -> ServiceResponse {
        self.rebalancer.set_auto_rebalance(enabled);
        ServiceResponse::ok(format!(
            "Auto-rebalancing {}",
            if enabled { "enabled" } else { "disabled" }
        ))
    }

    // --- Risk ---

    pub fn get_risk_alerts(&self) -> ServiceResponse {
        let alerts = self.gate.get_active_alerts();
        ServiceResponse::ok(format!("{} active alerts", alerts.len())).with_data(&alerts)
    }

    pub fn clear_risk_alerts(&self) -> ServiceResponse {
        let cleared = self.gate.clear_alerts();
        ServiceResponse::ok(format!("Cleared {} alerts", cleared))
    }

    pub fn clear_hard_breach(&self) -> ServiceResponse {
        if self.gate.clear_hard_breach() {
            ServiceResponse::ok("Hard breach cleared; sizing resumed")
        } else {
            ServiceResponse::ok("No hard breach active")
        }
    }

    // --- Health ---

    pub async fn health(&self) -> HealthReport {
        let broker_connected =
            tokio::time::timeout(self.config.execution.broker_timeout(), self.broker.is_connected())
                .await
                .unwrap_or(false);
        let pipeline_running = self.pipeline.is_running();
        let active_alerts = self.gate.get_active_alerts().len();
        let hard_breach = self.gate.halt_reason();
        let executions = self.executions.list();
        let active_executions = executions.iter().filter(|e| e.state.is_active()).count();

        let mut critical = Vec::new();
        let mut warnings = Vec::new();
        if let Some(reason) = &hard_breach {
            critical.push(format!("hard risk breach: {}", reason));
        }
        if !broker_connected {
            critical.push("broker disconnected".to_string());
        }
        if !pipeline_running {
            critical.push("execution pipeline stopped".to_string());
        }
        if active_alerts > self.config.system.critical_alert_count {
            critical.push(format!("{} active risk alerts", active_alerts));
        } else if active_alerts > 0 {
            warnings.push(format!("{} active risk alerts", active_alerts));
        }
        for failed in executions.iter().filter(|e| e.state == ExecutionState::Error) {
            warnings.push(format!("execution {} ({}) failed", failed.id, failed.strategy));
        }

        let status = if !critical.is_empty() {
            HealthStatus::Critical
        } else if !warnings.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        critical.extend(warnings);

        HealthReport {
            status,
            broker_connected,
            pipeline_running,
            active_alerts,
            hard_breach,
            active_executions,
            issues: critical,
            checked_at: Utc::now(),
        }
    }

    pub async fn health_check(&self) -> ServiceResponse {
        let report = self.health().await;
        ServiceResponse::ok(format!("System is {}", report.status)).with_data(&report)
    }

    pub fn status(&self) -> SystemStatus {
        let snapshot = self.portfolio.snapshot();
        let executions = self.executions.list();
        SystemStatus {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            strategies: self.executions.registry().names(),
            executions_total: executions.len(),
            executions_active: executions.iter().filter(|e| e.state.is_active()).count(),
            queue: self.pipeline.queue_status(),
            ledger_entries: self.pipeline.ledger().len(),
            total_value: snapshot.total_value,
            cash: snapshot.cash,
            positions: snapshot.positions.len(),
            rebalance: self.rebalance_status(),
            active_alerts: self.gate.get_active_alerts().len(),
            halted: self.gate.is_halted(),
        }
    }

    pub fn system_status(&self) -> ServiceResponse {
        let status = self.status();
        ServiceResponse::ok(format!(
            "{} active executions, {} queued orders",
            status.executions_active, status.queue.queued
        ))
        .with_data(&status)
    }

    // --- Shutdown ---

    fn persist(&self) -> anyhow::Result<Vec<PathBuf>> {
        let Some(dir) = &self.config.system.data_dir else {
            return Ok(Vec::new());
        };
        let store = StateStore::new(dir);
        Ok(vec![
            store.save("portfolio_history", &self.portfolio.history())?,
            store.save("execution_ledger", &self.pipeline.ledger().records())?,
        ])
    }

    /// Stops every execution, drains the pipeline, stops the background loops and saves
    /// the snapshot history. Calling it again is a no-op.
    pub async fn shutdown(&self) -> ServiceResponse {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return ServiceResponse::ok("Trading system already shut down");
        }
        info!("Shutting down trading system");

        let running: Vec<ExecutionId> = self
            .executions
            .list()
            .into_iter()
            .filter(|e| e.state.is_active())
            .map(|e| e.id)
            .collect();
        self.executions.stop_all().await;
        for id in running {
            if let Some(state) = self.executions.state(id) {
                self.bus.publish(SystemEvent::ExecutionStopped { id, state });
            }
            self.record_execution(id);
        }

        self.pipeline.shutdown().await;

        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("Background task ended abnormally: {}", e);
                self.bus.publish(SystemEvent::Error {
                    error: SystemError::fatal(format!("background task: {}", e)),
                });
            }
        }

        let last = self.portfolio.record_snapshot();
        if let Err(e) = self.snapshots.save(last.clone()) {
            warn!("Final snapshot not persisted: {}", e);
        }
        match self.persist() {
            Ok(paths) => {
                for path in &paths {
                    info!("Saved {}", path.display());
                }
                info!("Trading system stopped; final value {:.2}", last.total_value);
                ServiceResponse::ok("Trading system shut down").with_data(&last)
            }
            Err(e) => {
                warn!("State not saved on shutdown: {:#}", e);
                self.bus.publish(SystemEvent::Error {
                    error: SystemError::persistence(format!("{:#}", e)),
                });
                ServiceResponse::fail(format!("Shut down, but state was not saved: {:#}", e)).with_data(&last)
            }
        }
    }
}
