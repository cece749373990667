use crate::model::position::Position;

/// Read-only view of portfolio state shared with strategy executions.
///
/// Readers may observe state that is one fill-processing cycle old.
pub trait PortfolioView: Send + Sync {
    /// Cash plus the market value of every position.
    fn total_value(&self) -> f64;

    fn cash(&self) -> f64;

    fn position(&self, symbol: &str) -> Option<Position>;

    fn positions(&self) -> Vec<Position>;
}
