mod worker;

use crate::book::{HistoryFilter, OrderBook, QueueStatus};
use crate::models::{ExecutionConfig, ExecutionLedger, Ingress, LedgerRecord, Order};
use crate::validation;
use log::{info, warn};
use portfolio_manager::PortfolioState;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use trading::{
    BrokerGateway, Fill, MarketSnapshot, OrderId, OrderOrigin, OrderRequest, OrderState, Result,
    TradingError,
};
use worker::Worker;

/// Observable pipeline activity.
#[derive(Debug, Clone, Serialize)]
pub enum PipelineEvent {
    OrderUpdated {
        order_id: OrderId,
        origin: OrderOrigin,
        symbol: String,
        state: OrderState,
        message: Option<String>,
    },
    Filled {
        order_id: OrderId,
        origin: OrderOrigin,
        fill: Fill,
        ledger_index: u64,
    },
}

impl PipelineEvent {
    pub(crate) fn updated(order: &Order) -> Self {
        PipelineEvent::OrderUpdated {
            order_id: order.id(),
            origin: order.origin(),
            symbol: order.symbol().to_string(),
            state: order.state(),
            message: order.message().map(str::to_string),
        }
    }
}

pub(crate) fn lock_book(book: &Mutex<OrderBook>) -> MutexGuard<'_, OrderBook> {
    book.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the single-consumer order pipeline.
///
/// Producers call [`ExecutionPipeline::submit`] concurrently; admission and enqueueing
/// happen under one lock so the queue order equals the admission sequence.
pub struct ExecutionPipeline {
    config: ExecutionConfig,
    broker: Arc<dyn BrokerGateway>,
    book: Arc<Mutex<OrderBook>>,
    ledger: Arc<ExecutionLedger>,
    sender: mpsc::UnboundedSender<Ingress>,
    events: broadcast::Sender<PipelineEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionPipeline {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(config: ExecutionConfig, broker: Arc<dyn BrokerGateway>, portfolio: Arc<PortfolioState>) -> Self {
        let book = Arc::new(Mutex::new(OrderBook::new(config.allow_concurrent_orders)));
        let ledger = Arc::new(ExecutionLedger::new(config.ledger_csv.clone()));
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(1024);

        let worker = Worker {
            config: config.clone(),
            broker: broker.clone(),
            portfolio,
            book: book.clone(),
            ledger: ledger.clone(),
            events: events.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));
        info!(
            "Execution pipeline started (broker timeout {} ms, concurrent orders {})",
            config.broker_timeout_ms, config.allow_concurrent_orders
        );

        Self {
            config,
            broker,
            book,
            ledger,
            sender,
            events,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn book(&self) -> MutexGuard<'_, OrderBook> {
        lock_book(&self.book)
    }

    fn publish(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Validates an intent, checks broker connectivity and queues it as PENDING.
    pub async fn submit(&self, request: OrderRequest) -> Result<OrderId> {
        validation::validate(&request)?;
        let connected = tokio::time::timeout(self.config.broker_timeout(), self.broker.is_connected())
            .await
            .unwrap_or(false);
        if !connected {
            return Err(TradingError::connectivity("broker gateway is not connected"));
        }

        let order = {
            let mut book = self.book();
            let id = book.admit(request)?;
            if self.sender.send(Ingress::Order(id)).is_err() {
                let _ = book.transition(&id, OrderState::Error, Some("pipeline stopped".into()));
                return Err(TradingError::connectivity("execution pipeline is not running"));
            }
            book.get(&id).cloned()
        };

        let Some(order) = order else {
            return Err(TradingError::execution("admitted order missing from book"));
        };
        info!(
            "Order {} queued: {} {} {} ({:?}) from {} [seq {}]",
            order.id(),
            order.request().side,
            order.quantity(),
            order.symbol(),
            order.request().order_type,
            order.origin(),
            order.sequence()
        );
        self.publish(PipelineEvent::updated(&order));
        Ok(order.id())
    }

    /// Cancels a PENDING order immediately, or a SUBMITTED one at the broker. Orders
    /// with fills already booked are refused.
    pub async fn cancel(&self, id: OrderId) -> Result<Order> {
        {
            let mut book = self.book();
            let state = book
                .get(&id)
                .map(Order::state)
                .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))?;
            match state {
                OrderState::Pending => {
                    let order = book.transition(&id, OrderState::Cancelled, Some("cancelled before submission".into()))?;
                    drop(book);
                    info!("Order {} cancelled while pending", id);
                    self.publish(PipelineEvent::updated(&order));
                    return Ok(order);
                }
                state if state.is_amendable() => {}
                other => {
                    return Err(TradingError::validation(format!(
                        "order {} cannot be cancelled in state {}",
                        id, other
                    )))
                }
            }
        }

        let (reply, response) = oneshot::channel();
        self.sender
            .send(Ingress::Cancel { id, reply })
            .map_err(|_| TradingError::connectivity("execution pipeline is not running"))?;
        response
            .await
            .map_err(|_| TradingError::execution("pipeline worker dropped the cancel request"))?
    }

    /// Amends a PENDING order in place, or a SUBMITTED one at the broker. The new terms
    /// are validated again.
    pub async fn modify(&self, id: OrderId, request: OrderRequest) -> Result<Order> {
        validation::validate(&request)?;
        {
            let mut book = self.book();
            let state = book
                .get(&id)
                .map(Order::state)
                .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))?;
            match state {
                OrderState::Pending => {
                    let order = book.update(&id, |order| {
                        order.amend(request)?;
                        Ok(order.clone())
                    })?;
                    drop(book);
                    info!("Order {} modified while pending", id);
                    self.publish(PipelineEvent::updated(&order));
                    return Ok(order);
                }
                state if state.is_amendable() => {}
                other => {
                    return Err(TradingError::validation(format!(
                        "order {} cannot be modified in state {}",
                        id, other
                    )))
                }
            }
        }

        let (reply, response) = oneshot::channel();
        self.sender
            .send(Ingress::Modify { id, request, reply })
            .map_err(|_| TradingError::connectivity("execution pipeline is not running"))?;
        response
            .await
            .map_err(|_| TradingError::execution("pipeline worker dropped the modify request"))?
    }

    /// Queues marks for the worker to apply to portfolio state.
    pub fn mark(&self, snapshot: MarketSnapshot) -> Result<()> {
        self.sender
            .send(Ingress::Mark(snapshot))
            .map_err(|_| TradingError::connectivity("execution pipeline is not running"))
    }

    pub fn get_order(&self, id: &OrderId) -> Option<Order> {
        self.book().get(id).cloned()
    }

    pub fn orders_by_state(&self, state: OrderState) -> Vec<Order> {
        self.book().by_state(state)
    }

    pub fn working_orders(&self) -> Vec<Order> {
        self.book().working()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.book().status()
    }

    pub fn order_history(&self, filter: &HistoryFilter) -> Vec<Order> {
        self.book().history(filter)
    }

    /// Ledger records matching the filter, in ledger order.
    pub fn execution_history(&self, filter: &HistoryFilter) -> Vec<LedgerRecord> {
        let mut records: Vec<LedgerRecord> = self
            .ledger
            .records()
            .into_iter()
            .filter(|r| filter.matches(&r.fill.symbol, r.fill.timestamp))
            .collect();
        if let Some(limit) = filter.limit {
            let skip = records.len().saturating_sub(limit);
            records.drain(..skip);
        }
        records
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    /// Stops accepting work and waits for the worker to drain everything queued before
    /// this call.
    pub async fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if self.sender.send(Ingress::Shutdown).is_err() {
            warn!("Execution pipeline worker already stopped");
        }
        if let Err(e) = handle.await {
            warn!("Execution pipeline worker ended abnormally: {}", e);
        }
        info!("Execution pipeline stopped");
    }
}
