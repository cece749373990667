use async_trait::async_trait;
use execution_engine::ExecutionPipeline;
use log::{debug, warn};
use portfolio_manager::PortfolioState;
use risk_manager::{RiskGate, SignalInputs};
use std::sync::Arc;
use trading::{OrderOrigin, Repository, Result, Signal};
use trading_core::framework::{ExecutionContext, Routing, SignalEnvelope, SignalSink};

/// Routes strategy signals through the risk gate into the execution pipeline.
///
/// The runner awaits [`SignalSink::route`] per signal, so an execution's signals are
/// sized and enqueued in the order they were generated.
pub struct RiskRouter {
    gate: Arc<RiskGate>,
    portfolio: Arc<PortfolioState>,
    pipeline: Arc<ExecutionPipeline>,
    signals: Arc<dyn Repository<Signal>>,
}

impl RiskRouter {
    pub fn new(
        gate: Arc<RiskGate>,
        portfolio: Arc<PortfolioState>,
        pipeline: Arc<ExecutionPipeline>,
        signals: Arc<dyn Repository<Signal>>,
    ) -> Self {
        Self {
            gate,
            portfolio,
            pipeline,
            signals,
        }
    }
}

#[async_trait]
impl SignalSink for RiskRouter {
    async fn route(&self, ctx: &ExecutionContext, envelope: SignalEnvelope) -> Result<Routing> {
        // Every routed signal is recorded, declined or not.
        if let Err(e) = self.signals.save(envelope.signal.clone()) {
            warn!("Signal {} not persisted: {}", envelope.signal.id, e);
        }
        let inputs = SignalInputs {
            volatility: envelope.stats.volatility,
            atr: envelope.stats.atr,
            expected_return: envelope.stats.expected_return,
            size_hint: envelope.suggested_quantity,
        };
        let decision = self.gate.evaluate(&envelope.signal, &self.portfolio, &inputs);

        let Some(request) = decision.order_request(OrderOrigin::Execution(ctx.id())) else {
            let reason = decision
                .rejection
                .unwrap_or_else(|| "sized to zero".to_string());
            return Ok(Routing::Declined(reason));
        };

        // Validation and connectivity failures surface to the runner as errors.
        let order_id = self.pipeline.submit(request).await?;
        debug!(
            "Signal {} from execution {} enqueued as order {}",
            envelope.signal.id,
            ctx.id(),
            order_id
        );
        Ok(Routing::Submitted(order_id))
    }
}
