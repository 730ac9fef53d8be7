//! Background pool — tokio multi-thread runtime.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::{Handle, Runtime};
use uuid::Uuid;

use super::{Executor, Rejected, Work, scoped};
use crate::error::ContextError;

/// Parallel executor backed by a tokio multi-thread runtime.
///
/// Either owns its runtime (`new`) or borrows a host runtime (`from_handle`).
pub struct BackgroundPool {
    id: Uuid,
    name: String,
    handle: Handle,
    /// Present only when this pool built the runtime itself.
    runtime: Option<Runtime>,
    closed: AtomicBool,
}

impl BackgroundPool {
    /// Build a pool with its own runtime and `workers` threads.
    pub fn new(workers: usize, thread_name: impl Into<String>) -> Result<Self, ContextError> {
        let name = thread_name.into();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name(name.clone())
            .enable_all()
            .build()
            .map_err(|source| ContextError::Startup {
                name: name.clone(),
                source,
            })?;

        tracing::info!(name = %name, workers, "Background pool started");

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            closed: AtomicBool::new(false),
        })
    }

    /// Submit onto a runtime owned by the host. The runtime needs the time
    /// driver enabled for delayed work.
    pub fn from_handle(handle: Handle, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            handle,
            runtime: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Submit onto the runtime driving the caller.
    pub fn current(name: impl Into<String>) -> Result<Self, ContextError> {
        let name = name.into();
        let handle = Handle::try_current().map_err(|e| ContextError::Startup {
            name: name.clone(),
            source: std::io::Error::other(e),
        })?;
        Ok(Self::from_handle(handle, name))
    }

    /// Runtime handle work is spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Executor for BackgroundPool {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, work: Work) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::new(
                ContextError::Closed {
                    name: self.name.clone(),
                },
                work,
            ));
        }
        // JoinHandle dropped: completion is reported through our own handles.
        self.handle.spawn(scoped(self.id, work));
        Ok(())
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(name = %self.name, "Background pool closed to new work");
        }
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Safe from inside async contexts, unlike a plain drop.
            runtime.shutdown_background();
        }
    }
}
