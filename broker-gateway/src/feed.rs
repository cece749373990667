use async_trait::async_trait;
use std::sync::Arc;
use trading::{BrokerGateway, MarketDataFeed, MarketSnapshot, Result, TradingError};

/// Market data taken from a broker's quote endpoint.
pub struct QuoteFeed {
    broker: Arc<dyn BrokerGateway>,
}

impl QuoteFeed {
    pub fn new(broker: Arc<dyn BrokerGateway>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MarketDataFeed for QuoteFeed {
    async fn snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot> {
        if !self.broker.is_connected().await {
            return Err(TradingError::connectivity("quote source is not connected"));
        }
        self.broker.get_quote(symbols).await
    }
}
