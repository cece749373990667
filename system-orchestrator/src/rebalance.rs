use crate::event_bus::{EventBus, SystemEvent};
use chrono::Utc;
use execution_engine::ExecutionPipeline;
use log::{info, warn};
use portfolio_manager::{PortfolioState, RebalanceReason, Rebalancer, RebalancingTarget};
use serde::Serialize;
use std::sync::Arc;
use trading::{OrderId, OrderOrigin, OrderState, Result, TradingError};

/// What one rebalance attempt did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebalanceOutcome {
    pub needed: bool,
    pub reason: Option<RebalanceReason>,
    /// Set when the attempt did not run.
    pub skipped: Option<String>,
    pub targets: Vec<RebalancingTarget>,
    pub estimated_cost: f64,
    pub submitted: Vec<OrderId>,
    /// Intents the pipeline refused, as `symbol: reason`.
    pub refused: Vec<String>,
}

impl RebalanceOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Runs the rebalancer state machine and feeds its intents into the execution pipeline.
///
/// There is no other path from the rebalancer to the broker.
pub struct RebalanceDriver {
    rebalancer: Arc<Rebalancer>,
    portfolio: Arc<PortfolioState>,
    pipeline: Arc<ExecutionPipeline>,
    bus: EventBus,
}

impl RebalanceDriver {
    pub fn new(
        rebalancer: Arc<Rebalancer>,
        portfolio: Arc<PortfolioState>,
        pipeline: Arc<ExecutionPipeline>,
        bus: EventBus,
    ) -> Self {
        Self {
            rebalancer,
            portfolio,
            pipeline,
            bus,
        }
    }

    pub fn auto_enabled(&self) -> bool {
        self.rebalancer.is_auto_enabled()
    }

    fn unresolved_rebalance_orders(&self) -> usize {
        [OrderState::Pending, OrderState::Submitted, OrderState::PartiallyFilled]
            .into_iter()
            .flat_map(|state| self.pipeline.orders_by_state(state))
            .filter(|order| order.origin() == OrderOrigin::Rebalancer)
            .count()
    }

    /// Checks the book and, when trades are needed, submits them SELLs first.
    ///
    /// `force` trades every target regardless of drift or schedule. An attempt is skipped
    /// while orders of the previous rebalance are still unresolved.
    pub async fn run(&self, force: bool) -> Result<RebalanceOutcome> {
        let in_flight = self.unresolved_rebalance_orders();
        if in_flight > 0 {
            return Ok(RebalanceOutcome::skipped(format!(
                "{} rebalance orders still unresolved",
                in_flight
            )));
        }

        let now = Utc::now();
        let check = self.rebalancer.check_rebalancing_needed(&self.portfolio, now, force)?;
        let mut outcome = RebalanceOutcome {
            needed: check.needed,
            reason: check.reason,
            estimated_cost: check.estimated_cost(),
            targets: check.targets,
            ..Default::default()
        };
        if !outcome.needed {
            return Ok(outcome);
        }

        let requests = match self.rebalancer.begin_execution(now) {
            Ok(requests) => requests,
            Err(e) => {
                self.rebalancer.abandon()?;
                return Err(e);
            }
        };
        // The submissions own their task so `finish` runs even if this future is dropped.
        let pipeline = self.pipeline.clone();
        let rebalancer = self.rebalancer.clone();
        let bus = self.bus.clone();
        let submission = tokio::spawn(async move {
            for request in requests {
                let symbol = request.symbol.clone();
                match pipeline.submit(request).await {
                    Ok(order_id) => outcome.submitted.push(order_id),
                    Err(e) => {
                        warn!("Rebalance order for {} refused: {}", symbol, e);
                        outcome.refused.push(format!("{}: {}", symbol, e));
                    }
                }
            }
            rebalancer.finish(Utc::now(), outcome.submitted.len())?;

            if !outcome.submitted.is_empty() {
                info!(
                    "Rebalance ({:?}) submitted {} orders, {} refused",
                    outcome.reason,
                    outcome.submitted.len(),
                    outcome.refused.len()
                );
                bus.publish(SystemEvent::RebalanceCompleted {
                    orders: outcome.submitted.len(),
                    reason: outcome.reason,
                });
            }
            Ok::<_, TradingError>(outcome)
        });
        submission
            .await
            .map_err(|e| TradingError::execution(format!("rebalance submission task failed: {}", e)))?
    }
}
