use crate::framework::parameters::ParameterValue;
use crate::framework::registry::StrategyRegistry;
use crate::framework::runner::{ExecutionRunner, ExecutionStats, RuntimeConfig};
use crate::framework::sink::SignalSink;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use trading::{
    Entity, ExecutionId, ExecutionState, MarketDataFeed, PortfolioView, Result, TradingError,
};

/// What to run: a registered strategy, over a set of symbols, with parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub strategy: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterValue>,
}

fn default_owner() -> String {
    "system".to_string()
}

impl ExecutionRequest {
    pub fn new(strategy: impl Into<String>, owner: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            strategy: strategy.into(),
            owner: owner.into(),
            symbols,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Point-in-time status of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub id: ExecutionId,
    pub strategy: String,
    pub owner: String,
    pub symbols: Vec<String>,
    pub state: ExecutionState,
    pub started_at: DateTime<Utc>,
    pub iterations: u64,
    pub signals: u64,
    pub orders: u64,
    pub declined: u64,
    pub faults: u64,
    pub last_error: Option<String>,
    pub last_iteration_at: Option<DateTime<Utc>>,
}

impl Entity for ExecutionStatus {
    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.last_iteration_at.unwrap_or(self.started_at)
    }

    fn owner(&self) -> Option<String> {
        Some(self.owner.clone())
    }
}

struct ExecutionHandle {
    request: ExecutionRequest,
    started_at: DateTime<Utc>,
    state: watch::Receiver<ExecutionState>,
    stop: watch::Sender<bool>,
    stats: Arc<Mutex<ExecutionStats>>,
    task: Option<JoinHandle<ExecutionState>>,
}

impl ExecutionHandle {
    fn status(&self, id: ExecutionId) -> ExecutionStatus {
        let stats = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ExecutionStatus {
            id,
            strategy: self.request.strategy.clone(),
            owner: self.request.owner.clone(),
            symbols: self.request.symbols.clone(),
            state: *self.state.borrow(),
            started_at: self.started_at,
            iterations: stats.iterations,
            signals: stats.signals,
            orders: stats.orders,
            declined: stats.declined,
            faults: stats.faults,
            last_error: stats.last_error,
            last_iteration_at: stats.last_iteration_at,
        }
    }
}

/// Starts, stops and reports on strategy executions.
///
/// Each execution is an independent tokio task; a fault in one never affects another.
pub struct ExecutionManager {
    registry: Arc<StrategyRegistry>,
    feed: Arc<dyn MarketDataFeed>,
    sink: Arc<dyn SignalSink>,
    portfolio: Arc<dyn PortfolioView>,
    config: RuntimeConfig,
    executions: Mutex<HashMap<ExecutionId, ExecutionHandle>>,
}

impl ExecutionManager {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        feed: Arc<dyn MarketDataFeed>,
        sink: Arc<dyn SignalSink>,
        portfolio: Arc<dyn PortfolioView>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            feed,
            sink,
            portfolio,
            config,
            executions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Spawns a new execution. Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutionId)` once the task is spawned (initialization happens inside the task).
    /// * `Err(TradingError::Validation)` for an unknown strategy, no symbols, or bad parameters.
    pub fn start(&self, request: ExecutionRequest) -> Result<ExecutionId> {
        let (context, strategy) = self.registry.instantiate(&request)?;
        let id = context.id();

        let (state_tx, state_rx) = watch::channel(ExecutionState::Created);
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutionStats::default()));

        let runner = ExecutionRunner::new(
            context,
            strategy,
            self.feed.clone(),
            self.sink.clone(),
            self.portfolio.clone(),
            self.config.clone(),
            state_tx,
            stats.clone(),
            stop_rx,
        );
        let task = tokio::spawn(runner.run());

        info!(
            "Started execution {} ({} for {}) on {:?}",
            id, request.strategy, request.owner, request.symbols
        );

        self.lock().insert(
            id,
            ExecutionHandle {
                request,
                started_at: Utc::now(),
                state: state_rx,
                stop: stop_tx,
                stats,
                task: Some(task),
            },
        );
        Ok(id)
    }

    /// Requests cancellation and waits for the task to finish its current iteration.
    ///
    /// Orders already enqueued by the execution are not retracted.
    ///
    /// # Returns
    ///
    /// * `Ok(state)` - The final state (`STOPPED`, or `ERROR` if initialization had failed).
    /// * `Err(TradingError::Validation)` if the id is unknown or the execution was already stopped.
    pub async fn stop(&self, id: ExecutionId) -> Result<ExecutionState> {
        let task = {
            let mut executions = self.lock();
            let Some(handle) = executions.get_mut(&id) else {
                return Err(TradingError::validation(format!(
                    "execution {} not found",
                    id
                )));
            };
            let Some(task) = handle.task.take() else {
                return Err(TradingError::validation(format!(
                    "execution {} is already stopped",
                    id
                )));
            };
            handle.stop.send_replace(true);
            task
        };

        match task.await {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!("Execution {} task ended abnormally: {}", id, e);
                Err(TradingError::strategy(id.to_string(), e.to_string()))
            }
        }
    }

    /// Stops every execution that is still running.
    pub async fn stop_all(&self) {
        let ids: Vec<ExecutionId> = self
            .lock()
            .iter()
            .filter(|(_, h)| h.task.is_some())
            .map(|(id, _)| *id)
            .collect();
        let results = futures::future::join_all(ids.iter().map(|id| self.stop(*id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to stop execution {}: {}", id, e);
            }
        }
    }

    pub fn status(&self, id: ExecutionId) -> Option<ExecutionStatus> {
        self.lock().get(&id).map(|h| h.status(id))
    }

    pub fn state(&self, id: ExecutionId) -> Option<ExecutionState> {
        self.lock().get(&id).map(|h| *h.state.borrow())
    }

    /// Every known execution, oldest first.
    pub fn list(&self) -> Vec<ExecutionStatus> {
        let mut list: Vec<ExecutionStatus> =
            self.lock().iter().map(|(id, h)| h.status(*id)).collect();
        list.sort_by_key(|s| s.started_at);
        list
    }

    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|h| h.state.borrow().is_active())
            .count()
    }

    /// Subscribes to state changes of one execution.
    pub fn watch(&self, id: ExecutionId) -> Option<watch::Receiver<ExecutionState>> {
        self.lock().get(&id).map(|h| h.state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ExecutionId, ExecutionHandle>> {
        self.executions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
