//! Task state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a launched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted, body not started yet.
    Created,
    /// Body is executing.
    Running,
    /// Body returned a value and hooks ran.
    Completed,
    /// Body failed (or could not be scheduled) and hooks ran.
    Failed,
    /// Cancelled before or during the body; `finally` ran.
    Cancelled,
}

impl TaskState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, target),
            // From Created
            (Created, Running) | (Created, Cancelled) | (Created, Failed) |
            // From Running
            (Running, Completed) | (Running, Failed) | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}
