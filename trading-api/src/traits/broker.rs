use crate::error::Result;
use crate::model::identity::OrderId;
use crate::model::market_data::MarketSnapshot;
use crate::model::order::OrderRequest;
use crate::model::report::{BrokerOrderStatus, SubmitOutcome};
use async_trait::async_trait;

/// Boundary to a brokerage.
///
/// Only the execution pipeline submits through this interface. An `Err` from any call
/// means the broker could not be reached; business-level refusals travel inside
/// [`SubmitOutcome::Rejected`] or a `false` return.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Sends a new order to the broker.
    ///
    /// # Arguments
    ///
    /// * `order_id` - Pipeline-side identifier, usable as a client order id.
    /// * `request` - The validated order intent.
    ///
    /// # Returns
    ///
    /// * `Accepted { broker_order_id }` or `Rejected { reason }`.
    async fn submit_order(&self, order_id: &OrderId, request: &OrderRequest)
        -> Result<SubmitOutcome>;

    /// Requests cancellation. Returns `false` if the broker refused.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<bool>;

    /// Amends a working order in place. Brokers without amendment support return `false`.
    async fn modify_order(&self, _broker_order_id: &str, _request: &OrderRequest) -> Result<bool> {
        Ok(false)
    }

    /// Returns the cumulative broker-side status of an order.
    async fn get_order_status(&self, broker_order_id: &str) -> Result<BrokerOrderStatus>;

    async fn is_connected(&self) -> bool;

    /// Returns current quotes for the requested symbols. Unknown symbols are omitted.
    async fn get_quote(&self, symbols: &[String]) -> Result<MarketSnapshot>;
}
