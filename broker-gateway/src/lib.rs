//! # Broker Gateway
//!
//! Simulated brokerage used for paper trading and tests.
//!
//! - [`PaperBroker`] implements [`trading::BrokerGateway`] over an in-memory order book,
//!   matching against a random-walk price simulator.
//! - [`QuoteFeed`] exposes any broker's quotes as a [`trading::MarketDataFeed`].

pub mod config;
pub mod feed;
pub mod paper;
pub mod simulator;

pub use config::BrokerConfig;
pub use feed::QuoteFeed;
pub use paper::PaperBroker;
pub use simulator::RandomWalk;
