//! launchpad — launch work on a background or main context with lifecycle hooks.
//!
//! ```text
//! initially (caller thread) → body (chosen context) → on_error → finally
//!                                                    (same context or main)
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod failure;
pub mod task;

pub use config::DispatcherConfig;
pub use context::{BackgroundPool, Context, Executor, MainLoop};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result, TaskError};
pub use failure::{FailureKind, FailureReport};
pub use task::{FailureRoute, JobHandle, TaskHandle, TaskRequest, TaskState};
