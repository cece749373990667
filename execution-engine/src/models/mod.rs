pub mod config;
pub mod ingress;
pub mod ledger;
pub mod order;

pub use config::*;
pub use ingress::*;
pub use ledger::*;
pub use order::*;

#[cfg(test)]
mod tests;
