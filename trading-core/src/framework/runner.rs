use crate::framework::context::ExecutionContext;
use crate::framework::history::PriceHistory;
use crate::framework::sink::{Routing, SignalEnvelope, SignalSink};
use crate::framework::strategy::Strategy;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use trading::{
    Direction, ExecutionState, MarketDataFeed, MarketSnapshot, PortfolioView, Result, Signal,
    TradingError,
};

/// Timing of the per-execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Delay after the first failed iteration. Doubles per consecutive failure.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Prices kept per symbol for volatility and ATR estimates.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_tick_interval_ms() -> u64 {
    60_000
}

fn default_error_backoff_ms() -> u64 {
    60_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_history_size() -> usize {
    252
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            history_size: default_history_size(),
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Backoff after `failures` consecutive failed iterations (`failures >= 1`).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self
            .error_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms.max(self.error_backoff_ms));
        Duration::from_millis(delay)
    }
}

/// Counters of one execution, shared with the manager for status queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub iterations: u64,
    pub signals: u64,
    pub orders: u64,
    pub declined: u64,
    pub faults: u64,
    pub last_error: Option<String>,
    pub last_iteration_at: Option<DateTime<Utc>>,
}

/// Drives one strategy instance until cancelled.
pub struct ExecutionRunner {
    context: ExecutionContext,
    strategy: Box<dyn Strategy>,
    feed: Arc<dyn MarketDataFeed>,
    sink: Arc<dyn SignalSink>,
    portfolio: Arc<dyn PortfolioView>,
    config: RuntimeConfig,
    history: PriceHistory,
    state: watch::Sender<ExecutionState>,
    stats: Arc<Mutex<ExecutionStats>>,
    shutdown: watch::Receiver<bool>,
}

impl ExecutionRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: ExecutionContext,
        strategy: Box<dyn Strategy>,
        feed: Arc<dyn MarketDataFeed>,
        sink: Arc<dyn SignalSink>,
        portfolio: Arc<dyn PortfolioView>,
        config: RuntimeConfig,
        state: watch::Sender<ExecutionState>,
        stats: Arc<Mutex<ExecutionStats>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let history = PriceHistory::new(config.history_size);
        Self {
            context,
            strategy,
            feed,
            sink,
            portfolio,
            config,
            history,
            state,
            stats,
            shutdown,
        }
    }

    /// Runs the execution to completion and returns its final state.
    ///
    /// A failed iteration is logged and followed by a bounded backoff; it never ends the
    /// loop. A stop request is honoured once the current iteration has finished, after
    /// which `cleanup` is called exactly once.
    pub async fn run(mut self) -> ExecutionState {
        let id = self.context.id();
        self.transition(ExecutionState::Initializing);

        self.context.refresh(Utc::now(), self.portfolio.as_ref());
        let init = {
            let strategy = &mut self.strategy;
            let context = &self.context;
            guard(context.strategy(), || strategy.initialize(context))
        };
        if let Err(e) = init {
            error!("Execution {} failed to initialize: {}", id, e);
            self.record_error(&e);
            self.transition(ExecutionState::Error);
            return ExecutionState::Error;
        }

        self.transition(ExecutionState::Running);
        info!(
            "Execution {} running strategy '{}' on {:?}",
            id,
            self.context.strategy(),
            self.context.symbols()
        );

        let mut failures: u32 = 0;
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self.iterate().await {
                Ok(()) => {
                    failures = 0;
                    self.config.tick_interval()
                }
                Err(e) => {
                    failures += 1;
                    let backoff = self.config.backoff(failures);
                    error!(
                        "Execution {} iteration failed ({} in a row), retrying in {:?}: {}",
                        id, failures, backoff, e
                    );
                    self.record_error(&e);
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped with the manager.
                        break;
                    }
                }
            }
        }

        self.transition(ExecutionState::Stopping);
        let cleanup = {
            let strategy = &mut self.strategy;
            let context = &self.context;
            guard(context.strategy(), || {
                strategy.cleanup(context);
                Ok(())
            })
        };
        if let Err(e) = cleanup {
            warn!("Execution {} cleanup failed: {}", id, e);
        }
        self.transition(ExecutionState::Stopped);
        info!("Execution {} stopped", id);
        ExecutionState::Stopped
    }

    /// One tick: snapshot, signals, exits, routing.
    async fn iterate(&mut self) -> Result<()> {
        self.context.advance();
        self.context.refresh(Utc::now(), self.portfolio.as_ref());

        let snapshot = self.feed.snapshot(self.context.symbols()).await?;
        self.history.record(&snapshot);

        let sized = evaluate_tick(self.strategy.as_mut(), &self.context, &snapshot)?;

        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.iterations += 1;
            stats.last_iteration_at = Some(self.context.now());
        }

        for (signal, suggested_quantity) in sized {
            let envelope = SignalEnvelope {
                stats: self.history.stats(&signal.symbol),
                suggested_quantity,
                signal,
            };
            let symbol = envelope.signal.symbol.clone();
            let direction = envelope.signal.direction;

            let routed = self.sink.route(&self.context, envelope).await;
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.signals += 1;
            match routed {
                Ok(Routing::Submitted(order_id)) => {
                    stats.orders += 1;
                    debug!(
                        "Execution {}: {} {} routed as order {}",
                        self.context.id(),
                        direction,
                        symbol,
                        order_id
                    );
                }
                Ok(Routing::Declined(reason)) => {
                    stats.declined += 1;
                    debug!(
                        "Execution {}: {} {} declined: {}",
                        self.context.id(),
                        direction,
                        symbol,
                        reason
                    );
                }
                Err(e) => {
                    stats.declined += 1;
                    warn!(
                        "Execution {}: {} {} could not be routed: {}",
                        self.context.id(),
                        direction,
                        symbol,
                        e
                    );
                }
            }
        }

        Ok(())
    }

    fn transition(&self, next: ExecutionState) {
        let current = *self.state.borrow();
        if current.can_transition_to(next) {
            self.state.send_replace(next);
        } else {
            warn!(
                "Execution {}: ignoring illegal transition {} -> {}",
                self.context.id(),
                current,
                next
            );
        }
    }

    fn record_error(&self, e: &TradingError) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(e, TradingError::StrategyFault { .. }) {
            stats.faults += 1;
        }
        stats.last_error = Some(e.to_string());
    }
}

/// Strategy hooks for one snapshot: signal generation, exit checks on held positions,
/// then sizing hints. Returns the actionable signals tagged with the execution.
///
/// A faulting hook fails the whole tick before any signal is returned.
pub(crate) fn evaluate_tick(
    strategy: &mut dyn Strategy,
    context: &ExecutionContext,
    snapshot: &MarketSnapshot,
) -> Result<Vec<(Signal, Option<f64>)>> {
    let mut signals = guard(context.strategy(), || strategy.generate_signals(context, snapshot))?;

    let strategy = &*strategy;
    for position in context.positions().values() {
        if signals
            .iter()
            .any(|s| s.symbol == position.symbol && s.direction == Direction::Sell)
        {
            continue;
        }
        let Some(price) = snapshot.price(&position.symbol) else {
            continue;
        };
        let exit = guard(context.strategy(), || {
            Ok(strategy.should_exit(position, price, context))
        })?;
        if exit {
            signals.push(
                Signal::sell(&position.symbol, price, snapshot.timestamp)
                    .with_rationale("exit condition met"),
            );
        }
    }

    let execution_id = context.id();
    let actionable: Vec<Signal> = signals
        .into_iter()
        .filter(Signal::is_actionable)
        .map(|signal| signal.with_execution(execution_id))
        .collect();
    guard(context.strategy(), || {
        Ok(actionable
            .into_iter()
            .map(|signal| {
                let hint = strategy.size_position(&signal, context);
                (signal, hint)
            })
            .collect())
    })
}

/// Runs a strategy hook, turning both errors and panics into a `StrategyFault`.
pub(crate) fn guard<T>(strategy: &str, hook: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(TradingError::StrategyFault { strategy, message })) => {
            Err(TradingError::StrategyFault { strategy, message })
        }
        Ok(Err(e)) => Err(TradingError::strategy(strategy, e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Err(TradingError::strategy(strategy, message))
        }
    }
}
