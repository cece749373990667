use thiserror::Error;

/// Error taxonomy shared by every stage of the trading pipeline.
///
/// Validation and connectivity failures are returned synchronously to the caller.
/// Execution failures are recorded on the order they belong to. Strategy faults stay
/// inside the execution that raised them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    /// Malformed input, rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The broker gateway or market data source could not be reached.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// A risk limit blocked the request.
    #[error("risk limit breached: {0}")]
    RiskLimitBreach(String),

    /// The broker rejected or errored an order after submission.
    #[error("execution failed: {0}")]
    Execution(String),

    /// A strategy hook failed. Isolated to its own execution.
    #[error("strategy '{strategy}' faulted: {message}")]
    StrategyFault { strategy: String, message: String },

    /// A collaborator call exceeded its deadline.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// A state machine refused a transition.
    #[error("illegal transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl TradingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn risk(msg: impl Into<String>) -> Self {
        Self::RiskLimitBreach(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn strategy(strategy: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StrategyFault {
            strategy: strategy.into(),
            message: msg.into(),
        }
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// A specialized Result type for trading operations.
pub type Result<T> = std::result::Result<T, TradingError>;
