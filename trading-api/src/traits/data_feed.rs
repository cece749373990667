use crate::error::Result;
use crate::model::market_data::MarketSnapshot;
use async_trait::async_trait;

/// Source of market snapshots polled by strategy executions.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Fetches the latest `{symbol: {price, volume, timestamp}}` for the given symbols.
    ///
    /// # Returns
    ///
    /// * `Ok(MarketSnapshot)` - May contain fewer symbols than requested.
    /// * `Err(TradingError::Connectivity)` - If the source is unreachable.
    async fn snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot>;
}
