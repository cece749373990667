pub mod execution;
pub mod fill;
pub mod identity;
pub mod market_data;
pub mod order;
pub mod position;
pub mod report;
pub mod response;
pub mod signal;

#[cfg(test)]
mod tests;
