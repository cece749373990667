//! # Trading Core Library
//!
//! Shared foundation for the services of the trading pipeline.
//!
//! ## Modules
//! - `args`: Standardized command-line arguments.
//! - `config`: Layered configuration loading (file, then environment).
//! - `logging`: Logger initialization.
//! - `fs`: Atomic JSON state files.
//! - `repository`: In-memory implementation of the persistence boundary.
//! - `framework`: The strategy runtime (registry, execution context, runner, manager).

pub mod args;
pub mod config;
pub mod framework;
pub mod fs;
pub mod logging;
pub mod repository;
