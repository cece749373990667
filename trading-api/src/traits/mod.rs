pub mod broker;
pub mod data_feed;
pub mod portfolio;
pub mod repository;
