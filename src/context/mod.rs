//! Execution contexts — where work runs.
//!
//! Core components:
//! - `Context` — the two well-known contexts a request can name
//! - `Executor` — the seam hosts implement: `submit` work, report `is_current`
//! - `background` — tokio multi-thread pool (parallel, unordered)
//! - `main_loop` — dedicated single thread (ordered, one logical worker)

mod background;
mod main_loop;

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContextError;

pub use background::BackgroundPool;
pub use main_loop::MainLoop;

/// A unit of work accepted by an executor.
pub type Work = BoxFuture<'static, ()>;

/// Named execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    /// Parallel pool, no ordering between tasks.
    #[default]
    Background,
    /// Single logical worker, strictly ordered.
    Main,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Background => "background",
            Self::Main => "main",
        };
        write!(f, "{s}")
    }
}

/// Work an executor refused, handed back to the submitter.
pub struct Rejected {
    pub error: ContextError,
    work: Work,
}

impl Rejected {
    pub fn new(error: ContextError, work: Work) -> Self {
        Self { error, work }
    }

    /// Take the refused work back, e.g. to run it inline.
    pub fn into_parts(self) -> (ContextError, Work) {
        (self.error, self.work)
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Something that accepts work and knows whether the caller is already on it.
///
/// The default `is_current` relies on submitted work being wrapped with
/// [`scoped`]. Executors that cannot do that must override it.
pub trait Executor: Send + Sync + 'static {
    /// Stable identity of this executor.
    fn id(&self) -> Uuid;

    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Queue `work`. On refusal the work is returned untouched.
    fn submit(&self, work: Work) -> Result<(), Rejected>;

    /// Whether the calling task already runs on this executor.
    fn is_current(&self) -> bool {
        current_executor() == Some(self.id())
    }

    /// Stop accepting work. Already queued work may still run.
    fn shutdown(&self) {}
}

tokio::task_local! {
    static CURRENT_EXECUTOR: Uuid;
}

/// Id of the executor driving the calling task, if it is one of ours.
///
/// Only visible from inside the submitted future; threads spawned by a body
/// (or `spawn_blocking`) see `None`.
pub fn current_executor() -> Option<Uuid> {
    CURRENT_EXECUTOR.try_with(|id| *id).ok()
}

/// Tag `work` with an executor id for the duration of every poll.
pub fn scoped(id: Uuid, work: Work) -> impl Future<Output = ()> + Send + 'static {
    CURRENT_EXECUTOR.scope(id, work)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_background() {
        assert_eq!(Context::default(), Context::Background);
    }

    #[test]
    fn context_display() {
        assert_eq!(Context::Background.to_string(), "background");
        assert_eq!(Context::Main.to_string(), "main");
    }

    #[test]
    fn context_serde() {
        let json = serde_json::to_string(&Context::Main).unwrap();
        assert_eq!(json, "\"main\"");
        let parsed: Context = serde_json::from_str("\"background\"").unwrap();
        assert_eq!(parsed, Context::Background);
    }

    #[tokio::test]
    async fn scope_sets_current_executor() {
        let id = Uuid::new_v4();
        assert_eq!(current_executor(), None);

        let (tx, rx) = tokio::sync::oneshot::channel();
        scoped(
            id,
            Box::pin(async move {
                let _ = tx.send(current_executor());
            }),
        )
        .await;

        assert_eq!(rx.await.unwrap(), Some(id));
        assert_eq!(current_executor(), None);
    }
}
