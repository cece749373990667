//! Background loops of the running system.
//!
//! Each loop owns clones of the services it needs and stops when the shared shutdown
//! flag flips to `true`. None of them talks to the broker for orders: marks go through
//! the pipeline worker and rebalances through [`RebalanceDriver`].

use crate::event_bus::{EventBus, SystemError, SystemEvent};
use crate::rebalance::RebalanceDriver;
use execution_engine::{ExecutionPipeline, Order, PipelineEvent};
use log::{debug, info, warn};
use portfolio_manager::{PortfolioSnapshot, PortfolioState};
use risk_manager::RiskGate;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use trading::{BrokerGateway, Entity, Fill, OrderState, PortfolioView, Repository};
use uuid::Uuid;

/// Symbols marked on every snapshot tick in addition to the held ones.
#[derive(Debug, Default)]
pub struct Watchlist {
    symbols: Mutex<BTreeSet<String>>,
}

impl Watchlist {
    pub fn new(symbols: impl IntoIterator<Item = String>) -> Self {
        Self {
            symbols: Mutex::new(symbols.into_iter().collect()),
        }
    }

    pub fn extend(&self, symbols: impl IntoIterator<Item = String>) {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(symbols);
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Returns `true` once shutdown was requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) -> bool {
    shutdown.changed().await.is_err() || *shutdown.borrow()
}

/// Marks the book, records a snapshot and re-evaluates portfolio risk limits.
pub(crate) struct SnapshotLoop {
    pub broker: Arc<dyn BrokerGateway>,
    pub pipeline: Arc<ExecutionPipeline>,
    pub portfolio: Arc<PortfolioState>,
    pub gate: Arc<RiskGate>,
    pub snapshots: Arc<dyn Repository<PortfolioSnapshot>>,
    pub watchlist: Arc<Watchlist>,
    pub bus: EventBus,
    pub interval: Duration,
    pub broker_timeout: Duration,
}

impl SnapshotLoop {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut announced: HashSet<Uuid> = HashSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                done = stopped(&mut shutdown) => {
                    if done {
                        break;
                    }
                    continue;
                }
            }
            self.mark().await;
            self.snapshot(&mut announced);
        }
        debug!("Snapshot loop stopped");
    }

    async fn mark(&self) {
        let mut symbols = self.watchlist.symbols();
        symbols.extend(self.portfolio.positions().into_iter().map(|p| p.symbol));
        if symbols.is_empty() {
            return;
        }
        let symbols: Vec<String> = symbols.into_iter().collect();

        let quote = match tokio::time::timeout(self.broker_timeout, self.broker.get_quote(&symbols)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("Market snapshot failed: {}", e);
                self.bus.publish(SystemEvent::Error {
                    error: SystemError::connectivity(e.to_string()),
                });
                return;
            }
            Err(_) => {
                warn!("Market snapshot timed out after {:?}", self.broker_timeout);
                self.bus.publish(SystemEvent::Error {
                    error: SystemError::connectivity("market snapshot timed out"),
                });
                return;
            }
        };
        if let Err(e) = self.pipeline.mark(quote) {
            warn!("Marks not applied: {}", e);
        }
    }

    fn snapshot(&self, announced: &mut HashSet<Uuid>) {
        let snapshot = self.portfolio.record_snapshot();
        let active = self.gate.check_portfolio(&snapshot);
        if let Err(e) = self.snapshots.save(snapshot) {
            warn!("Portfolio snapshot not persisted: {}", e);
            self.bus.publish(SystemEvent::Error {
                error: SystemError::persistence(e.to_string()),
            });
        }

        for alert in &active {
            if announced.insert(alert.id) {
                self.bus.publish(SystemEvent::RiskAlert { alert: alert.clone() });
            }
        }
        announced.retain(|id| active.iter().any(|a| a.id == *id));
    }
}

/// Forwards pipeline events onto the bus, persists order updates and wakes the
/// rebalance loop after fills.
pub(crate) struct FillListener {
    pub events: broadcast::Receiver<PipelineEvent>,
    pub pipeline: Arc<ExecutionPipeline>,
    pub orders: Arc<dyn Repository<Order>>,
    pub fills: Arc<dyn Repository<Fill>>,
    pub bus: EventBus,
    pub rebalance_trigger: Arc<Notify>,
}

impl FillListener {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Ok(event) => self.handle(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Fill listener lagged, {} pipeline events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                done = stopped(&mut shutdown) => {
                    if done {
                        break;
                    }
                }
            }
        }
        debug!("Fill listener stopped");
    }

    fn handle(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::Filled {
                order_id,
                origin,
                fill,
                ledger_index,
            } => {
                info!(
                    "Fill #{} for order {} ({}): {} {} {} @ {:.4}",
                    ledger_index, order_id, origin, fill.side, fill.quantity, fill.symbol, fill.price
                );
                if let Err(e) = self.fills.save(fill.clone()) {
                    warn!("Fill {} not persisted: {}", fill.id, e);
                    self.bus.publish(SystemEvent::Error {
                        error: SystemError::persistence(format!("fill {}: {}", fill.id, e)),
                    });
                }
                self.rebalance_trigger.notify_one();
            }
            PipelineEvent::OrderUpdated {
                order_id,
                state,
                message,
                ..
            } => {
                if matches!(state, OrderState::Rejected | OrderState::Error) {
                    warn!(
                        "Order {} ended {}: {}",
                        order_id,
                        state,
                        message.as_deref().unwrap_or("no reason given")
                    );
                }
                if let Some(order) = self.pipeline.get_order(order_id) {
                    let id = order.entity_id();
                    if let Err(e) = self.orders.save(order) {
                        warn!("Order {} not persisted: {}", id, e);
                        self.bus.publish(SystemEvent::Error {
                            error: SystemError::persistence(format!("order {}: {}", id, e)),
                        });
                    }
                }
            }
        }
        self.bus.publish(SystemEvent::Order { event });
    }
}

/// Runs non-forced rebalance checks on a timer and after fills while auto-rebalancing
/// is enabled.
pub(crate) struct RebalanceLoop {
    pub driver: Arc<RebalanceDriver>,
    pub trigger: Arc<Notify>,
    pub interval: Duration,
}

impl RebalanceLoop {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
                done = stopped(&mut shutdown) => {
                    if done {
                        break;
                    }
                    continue;
                }
            }
            if !self.driver.auto_enabled() {
                continue;
            }
            match self.driver.run(false).await {
                Ok(outcome) => {
                    if let Some(reason) = outcome.skipped {
                        debug!("Auto-rebalance skipped: {}", reason);
                    } else if !outcome.needed {
                        debug!("Auto-rebalance check: no trades needed");
                    }
                }
                Err(e) => warn!("Auto-rebalance failed: {}", e),
            }
        }
        debug!("Rebalance loop stopped");
    }
}
