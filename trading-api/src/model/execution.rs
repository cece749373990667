use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one strategy execution.
///
/// ```text
/// CREATED -> INITIALIZING -> RUNNING -> STOPPING -> STOPPED
///                  \-> ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Created,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ExecutionState {
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Running | Error)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            ExecutionState::Created | ExecutionState::Initializing | ExecutionState::Running
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, ExecutionState::Stopped | ExecutionState::Error)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Created => "CREATED",
            ExecutionState::Initializing => "INITIALIZING",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Stopping => "STOPPING",
            ExecutionState::Stopped => "STOPPED",
            ExecutionState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}
