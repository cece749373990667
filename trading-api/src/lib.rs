pub mod error;
pub mod model;
pub mod traits;

pub use error::{Result, TradingError};
pub use model::execution::ExecutionState;
pub use model::fill::Fill;
pub use model::identity::{ExecutionId, FillId, OrderId, SignalId};
pub use model::market_data::{MarketSnapshot, Quote};
pub use model::order::{OrderOrigin, OrderRequest, OrderState, OrderType, Side, Validity};
pub use model::position::Position;
pub use model::report::{BrokerOrderStatus, SubmitOutcome};
pub use model::response::ServiceResponse;
pub use model::signal::{Direction, Signal};
pub use traits::broker::BrokerGateway;
pub use traits::data_feed::MarketDataFeed;
pub use traits::portfolio::PortfolioView;
pub use traits::repository::{Entity, QueryFilter, Repository};

pub mod prelude {
    pub use crate::model::market_data::{MarketSnapshot, Quote};
    pub use crate::model::signal::{Direction, Signal};
    pub use crate::model::position::Position;
    pub use crate::traits::broker::BrokerGateway;
    pub use crate::traits::data_feed::MarketDataFeed;
    pub use crate::traits::portfolio::PortfolioView;
    pub use crate::{Result, TradingError};
}
