use super::{lock_book, PipelineEvent};
use crate::book::OrderBook;
use crate::models::{ExecutionConfig, ExecutionLedger, Ingress, Order};
use log::{debug, error, info, warn};
use portfolio_manager::PortfolioState;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use trading::{
    BrokerGateway, BrokerOrderStatus, Fill, OrderId, OrderRequest, OrderState, Result, SubmitOutcome,
    TradingError,
};

const QUANTITY_EPSILON: f64 = 1e-9;

/// The only consumer of the ingress queue and the only writer of portfolio state.
pub(super) struct Worker {
    pub(super) config: ExecutionConfig,
    pub(super) broker: Arc<dyn BrokerGateway>,
    pub(super) portfolio: Arc<PortfolioState>,
    pub(super) book: Arc<Mutex<OrderBook>>,
    pub(super) ledger: Arc<ExecutionLedger>,
    pub(super) events: broadcast::Sender<PipelineEvent>,
}

impl Worker {
    pub(super) async fn run(self, mut receiver: mpsc::UnboundedReceiver<Ingress>) {
        let mut sweep = tokio::time::interval(self.config.working_order_sweep());
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                message = receiver.recv() => match message {
                    Some(Ingress::Shutdown) | None => break,
                    Some(message) => self.handle(message).await,
                },
                _ = sweep.tick() => self.sweep().await,
            }
        }

        // Anything that raced in behind the shutdown marker is resolved, never left PENDING.
        receiver.close();
        let mut abandoned = 0;
        while let Ok(message) = receiver.try_recv() {
            match message {
                Ingress::Order(id) => {
                    self.resolve(&id, OrderState::Cancelled, "pipeline shut down".to_string());
                    abandoned += 1;
                }
                Ingress::Cancel { reply, .. } | Ingress::Modify { reply, .. } => {
                    let _ = reply.send(Err(TradingError::connectivity("execution pipeline shut down")));
                }
                Ingress::Mark(_) | Ingress::Shutdown => {}
            }
        }
        info!("Execution pipeline worker drained ({} late orders cancelled)", abandoned);
    }

    async fn handle(&self, message: Ingress) {
        match message {
            Ingress::Order(id) => self.process(id).await,
            Ingress::Mark(snapshot) => self.portfolio.mark_to_market(&snapshot),
            Ingress::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id).await);
            }
            Ingress::Modify { id, request, reply } => {
                let _ = reply.send(self.modify(id, request).await);
            }
            Ingress::Shutdown => {}
        }
    }

    fn book(&self) -> MutexGuard<'_, OrderBook> {
        lock_book(&self.book)
    }

    fn publish(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    /// Bounds a broker call by the configured timeout.
    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.broker_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(TradingError::Timeout(self.config.broker_timeout_ms)),
        }
    }

    fn resolve(&self, id: &OrderId, state: OrderState, message: String) {
        let result = self.book().transition(id, state, Some(message));
        match result {
            Ok(order) => self.publish(PipelineEvent::updated(&order)),
            Err(e) => warn!("Order {} could not move to {}: {}", id, state, e),
        }
    }

    /// Broker failures are terminal for the order; nothing is retried.
    fn fail(&self, id: &OrderId, err: TradingError) {
        error!("Order {} failed at the broker: {}", id, err);
        self.resolve(id, OrderState::Error, err.to_string());
    }

    async fn process(&self, id: OrderId) {
        let request = {
            let mut book = self.book();
            match book.get(&id).map(Order::state) {
                Some(OrderState::Pending) => {}
                Some(state) => {
                    debug!("Skipping order {} already {}", id, state);
                    return;
                }
                None => {
                    warn!("Queued order {} is not in the book", id);
                    return;
                }
            }
            match book.transition(&id, OrderState::Submitted, None) {
                Ok(order) => {
                    let request = order.request().clone();
                    drop(book);
                    self.publish(PipelineEvent::updated(&order));
                    request
                }
                Err(e) => {
                    error!("Order {} could not be submitted: {}", id, e);
                    return;
                }
            }
        };

        match self.call(self.broker.submit_order(&id, &request)).await {
            Err(e) => self.fail(&id, e),
            Ok(SubmitOutcome::Rejected { reason }) => {
                warn!("Order {} rejected by broker: {}", id, reason);
                self.resolve(&id, OrderState::Rejected, reason);
            }
            Ok(SubmitOutcome::Accepted { broker_order_id }) => {
                let stored = self.book().update(&id, |order| {
                    order.set_broker_order_id(broker_order_id.clone());
                    Ok(())
                });
                if let Err(e) = stored {
                    error!("Order {} vanished after broker acceptance: {}", id, e);
                    return;
                }
                debug!("Order {} accepted by broker as {}", id, broker_order_id);
                self.poll(&id, &broker_order_id).await;
            }
        }
    }

    /// Polls a freshly accepted order until it resolves or the attempts run out; anything
    /// still open is picked up by the periodic sweep.
    async fn poll(&self, id: &OrderId, broker_order_id: &str) {
        let attempts = self.config.fill_poll_attempts.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.fill_poll_interval()).await;
            }
            if !self.refresh(id, broker_order_id).await {
                return;
            }
        }
        debug!("Order {} still working after {} polls", id, attempts);
    }

    /// Returns whether the order is still working afterwards.
    async fn refresh(&self, id: &OrderId, broker_order_id: &str) -> bool {
        match self.call(self.broker.get_order_status(broker_order_id)).await {
            Ok(status) => self.apply_status(id, status),
            Err(e) => {
                self.fail(id, e);
                false
            }
        }
    }

    /// Turns cumulative broker status into incremental fills, applies them to the
    /// portfolio and the ledger, then moves the order to the reported state.
    fn apply_status(&self, id: &OrderId, status: BrokerOrderStatus) -> bool {
        let (fill, origin, sequence) = {
            let book = self.book();
            let Some(order) = book.get(id) else {
                return false;
            };
            let delta = status.filled_quantity - order.filled_quantity();
            let fill = (delta > QUANTITY_EPSILON).then(|| {
                let notional = status.average_price * status.filled_quantity
                    - order.average_fill_price() * order.filled_quantity();
                let fees = (status.fees - order.fees()).max(0.0);
                Fill::new(*id, order.symbol(), order.request().side, delta, notional / delta, fees)
            });
            (fill, order.origin(), order.sequence())
        };

        let filled = fill.is_some();
        if let Some(fill) = fill {
            if let Err(e) = self.portfolio.apply_fill(&fill) {
                self.fail(id, e);
                return false;
            }
            let record = self.ledger.append(fill.clone(), origin, sequence);
            let _ = self.book().update(id, |order| {
                order.record_fill(fill.quantity, fill.price, fill.fees);
                Ok(())
            });
            info!(
                "Fill {}: {} {} {} @ {:.4} for order {} (ledger #{})",
                fill.id, fill.side, fill.quantity, fill.symbol, fill.price, id, record.index
            );
            self.publish(PipelineEvent::Filled {
                order_id: *id,
                origin,
                fill,
                ledger_index: record.index,
            });
        }

        let current = match self.book().get(id) {
            Some(order) => order.state(),
            None => return false,
        };
        let next = status.state;
        let moves = match next {
            OrderState::Pending | OrderState::Submitted => false,
            OrderState::PartiallyFilled => filled || current == OrderState::Submitted,
            _ => next != current,
        };
        if moves {
            let result = self.book().transition(id, next, status.message);
            match result {
                Ok(order) => {
                    if order.is_terminal() {
                        info!(
                            "Order {} {}: filled {}/{} avg {:.4}",
                            id,
                            order.state(),
                            order.filled_quantity(),
                            order.quantity(),
                            order.average_fill_price()
                        );
                    }
                    self.publish(PipelineEvent::updated(&order));
                    !order.is_terminal()
                }
                Err(e) => {
                    warn!("Broker reported {} for order {}: {}", next, id, e);
                    !current.is_terminal()
                }
            }
        } else {
            !current.is_terminal()
        }
    }

    async fn sweep(&self) {
        let working = self.book().working();
        for order in working {
            if let Some(broker_order_id) = order.broker_order_id() {
                self.refresh(&order.id(), broker_order_id).await;
            }
        }
    }

    /// Broker id of an order the operator may still amend. The state can have moved
    /// on between admission of the request and its turn in the queue.
    fn amendable_broker_id(&self, id: &OrderId, action: &str) -> Result<String> {
        let book = self.book();
        let order = book
            .get(id)
            .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))?;
        if !order.state().is_amendable() {
            return Err(TradingError::validation(format!(
                "order {} cannot be {} in state {}",
                id,
                action,
                order.state()
            )));
        }
        order
            .broker_order_id()
            .map(str::to_string)
            .ok_or_else(|| TradingError::execution(format!("order {} has no broker id", id)))
    }

    async fn cancel(&self, id: OrderId) -> Result<Order> {
        let broker_order_id = self.amendable_broker_id(&id, "cancelled")?;
        let cancelled = match self.call(self.broker.cancel_order(&broker_order_id)).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                let message = e.to_string();
                self.fail(&id, e);
                return Err(TradingError::execution(message));
            }
        };
        if !cancelled {
            return Err(TradingError::execution(format!(
                "broker refused to cancel order {}",
                id
            )));
        }

        // Pick up any fills that landed before the cancel took effect.
        if self.refresh(&id, &broker_order_id).await {
            self.resolve(&id, OrderState::Cancelled, "cancelled at broker".to_string());
        }
        info!("Order {} cancelled at broker", id);
        self.book()
            .get(&id)
            .cloned()
            .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))
    }

    async fn modify(&self, id: OrderId, request: OrderRequest) -> Result<Order> {
        let broker_order_id = self.amendable_broker_id(&id, "modified")?;
        let mut preview = self
            .book()
            .get(&id)
            .cloned()
            .ok_or_else(|| TradingError::validation(format!("unknown order {}", id)))?;
        preview.amend(request.clone())?;
        let amended = match self.call(self.broker.modify_order(&broker_order_id, &request)).await {
            Ok(amended) => amended,
            Err(e) => {
                let message = e.to_string();
                self.fail(&id, e);
                return Err(TradingError::execution(message));
            }
        };
        if !amended {
            return Err(TradingError::execution(format!(
                "broker refused to modify order {}",
                id
            )));
        }

        let order = self.book().update(&id, |order| {
            order.amend(request)?;
            Ok(order.clone())
        })?;
        info!("Order {} modified at broker", id);
        self.publish(PipelineEvent::updated(&order));
        Ok(order)
    }
}
