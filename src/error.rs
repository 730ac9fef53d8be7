//! Error types for launchpad.

use std::any::Any;
use std::sync::Arc;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by executors.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Failed to start {name}: {source}")]
    Startup {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Context {name} is shut down")]
    Closed { name: String },

    #[error("Context {name} thread panicked")]
    Panicked { name: String },
}

/// Terminal failure of a launched task.
///
/// Cloneable so the same failure can be handed to `on_error` and surfaced
/// through the task handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("Task body failed: {0}")]
    Failed(Arc<anyhow::Error>),

    #[error("Task body panicked: {0}")]
    Panicked(String),

    #[error("Lifecycle hook panicked: {0}")]
    HookPanicked(String),

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Context {context} unavailable: {reason}")]
    ContextUnavailable { context: String, reason: String },

    #[error("Task was dropped before it completed")]
    Abandoned,
}

impl TaskError {
    /// Wrap a body error.
    pub fn failed(err: anyhow::Error) -> Self {
        Self::Failed(Arc::new(err))
    }

    /// Build from a panic payload caught while polling a body.
    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }

    /// Build from a panic raised by `on_error` or `finally`.
    pub fn hook_panicked(payload: &(dyn Any + Send)) -> Self {
        Self::HookPanicked(panic_message(payload))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for failures caused by the executor rather than the body.
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::ContextUnavailable { .. } | Self::Abandoned)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl From<ContextError> for TaskError {
    fn from(err: ContextError) -> Self {
        let context = match &err {
            ContextError::Startup { name, .. }
            | ContextError::Closed { name }
            | ContextError::Panicked { name } => name.clone(),
        };
        Self::ContextUnavailable {
            context,
            reason: err.to_string(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_messages() {
        let err = TaskError::panicked(Box::new("boom"));
        assert_eq!(err.to_string(), "Task body panicked: boom");

        let err = TaskError::panicked(Box::new(String::from("owned boom")));
        assert!(matches!(err, TaskError::Panicked(ref m) if m == "owned boom"));

        let err = TaskError::panicked(Box::new(42_u32));
        assert!(matches!(err, TaskError::Panicked(ref m) if m.contains("non-string")));
    }

    #[test]
    fn hook_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("finally failed");
        let err = TaskError::hook_panicked(payload.as_ref());
        assert_eq!(err.to_string(), "Lifecycle hook panicked: finally failed");
        assert!(!err.is_routing());
    }

    #[test]
    fn failed_keeps_source_message() {
        let err = TaskError::failed(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "Task body failed: disk full");
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }

    #[test]
    fn concern_errors_lift_into_umbrella() {
        let err: Error = ConfigError::InvalidValue {
            key: "LAUNCHPAD_BACKGROUND_WORKERS".to_string(),
            message: "must be positive".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));

        let lifted: Result<()> = Err(TaskError::Cancelled.into());
        assert!(matches!(lifted, Err(Error::Task(TaskError::Cancelled))));
    }

    #[test]
    fn closed_context_maps_to_unavailable() {
        let err: TaskError = ContextError::Closed {
            name: "main".to_string(),
        }
        .into();
        assert!(err.is_routing());
        assert!(matches!(
            err,
            TaskError::ContextUnavailable { ref context, .. } if context == "main"
        ));
    }
}
