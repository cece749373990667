//! Risk gate: turns a strategy signal and the current book into a sized, risk-checked
//! order intent, and watches portfolio-level limits.

pub mod alerts;
pub mod config;
pub mod decision;
pub mod gate;
pub mod policy;
pub mod sizing;
pub mod stops;

pub use alerts::{AlertKind, AlertSeverity, AlertStore, RiskAlert};
pub use config::{PositionSizing, RiskConfig};
pub use decision::{RiskDecision, SignalInputs};
pub use gate::RiskGate;
pub use policy::{Policy, PolicyVerdict, RiskContext, RiskGuard};
pub use sizing::{SizingInputs, SizingPolicy};
pub use stops::StopLevels;

#[cfg(test)]
mod tests;
