//! Uncaught-failure channel.
//!
//! Failures nobody handled are logged and broadcast to subscribers
//! (crash reporters, test harnesses). Sending with no subscriber is fine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DEFAULT_FAILURE_CAPACITY;
use crate::context::Context;
use crate::error::TaskError;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task body failed and no `on_error` hook took it.
    Body,
    /// Work could not be moved to, or completed on, its context.
    Routing,
    /// An `on_error` or `finally` hook panicked on the main context.
    Hook,
}

/// One unhandled failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub task_id: Uuid,
    pub context: Context,
    pub kind: FailureKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Broadcast fan-out of failure reports.
#[derive(Debug, Clone)]
pub struct FailureChannel {
    tx: broadcast::Sender<FailureReport>,
}

impl FailureChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FailureReport> {
        self.tx.subscribe()
    }

    /// Log and broadcast a failure.
    pub fn report(&self, task_id: Uuid, context: Context, kind: FailureKind, error: &TaskError) {
        tracing::error!(
            task_id = %task_id,
            context = %context,
            kind = ?kind,
            error = %error,
            "Unhandled task failure"
        );

        let _ = self.tx.send(FailureReport {
            task_id,
            context,
            kind,
            message: error.to_string(),
            occurred_at: Utc::now(),
        });
    }
}

impl Default for FailureChannel {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_CAPACITY)
    }
}
