use crate::framework::context::ExecutionContext;
use crate::framework::history::PriceHistory;
use crate::framework::runner::{evaluate_tick, guard};
use crate::framework::sink::SignalEnvelope;
use crate::framework::strategy::Strategy;
use log::warn;
use trading::{MarketSnapshot, PortfolioView, Result};

/// Steps one strategy instance through recorded snapshots on their own clock.
///
/// The hooks run exactly as in [`ExecutionRunner`](crate::framework::runner::ExecutionRunner),
/// but the context time is the snapshot's timestamp and the caller decides what happens
/// to the returned signals. Nothing here touches a broker.
pub struct ReplayRunner {
    context: ExecutionContext,
    strategy: Box<dyn Strategy>,
    history: PriceHistory,
}

impl ReplayRunner {
    pub fn new(context: ExecutionContext, strategy: Box<dyn Strategy>, history_size: usize) -> Self {
        Self {
            context,
            strategy,
            history: PriceHistory::new(history_size),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Calls `initialize` at the time of the first snapshot.
    pub fn initialize(&mut self, first: &MarketSnapshot, portfolio: &dyn PortfolioView) -> Result<()> {
        self.context.refresh(first.timestamp, portfolio);
        let strategy = &mut self.strategy;
        let context = &self.context;
        guard(context.strategy(), || strategy.initialize(context))
    }

    /// One tick at `snapshot.timestamp`. Returns the envelopes to route, in generation order.
    pub fn step(&mut self, snapshot: &MarketSnapshot, portfolio: &dyn PortfolioView) -> Result<Vec<SignalEnvelope>> {
        self.context.advance();
        self.context.refresh(snapshot.timestamp, portfolio);
        self.history.record(snapshot);

        let sized = evaluate_tick(self.strategy.as_mut(), &self.context, snapshot)?;
        Ok(sized
            .into_iter()
            .map(|(signal, suggested_quantity)| SignalEnvelope {
                stats: self.history.stats(&signal.symbol),
                suggested_quantity,
                signal,
            })
            .collect())
    }

    /// Calls `cleanup` once and hands back the final context.
    pub fn finish(mut self) -> ExecutionContext {
        let cleanup = {
            let strategy = &mut self.strategy;
            let context = &self.context;
            guard(context.strategy(), || {
                strategy.cleanup(context);
                Ok(())
            })
        };
        if let Err(e) = cleanup {
            warn!("Replay of '{}' cleanup failed: {}", self.context.strategy(), e);
        }
        self.context
    }
}
