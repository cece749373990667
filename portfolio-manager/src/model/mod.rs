pub mod config;
pub mod snapshot;
pub mod target;
