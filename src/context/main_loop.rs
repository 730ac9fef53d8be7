//! Main loop — one dedicated thread, work runs in submission order.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use uuid::Uuid;

use super::{Executor, Rejected, Work, scoped};
use crate::error::ContextError;

/// Single-worker executor standing in for a host UI/event thread.
///
/// Messages are received in order over an unbounded channel and spawned on a
/// `LocalSet`, so synchronous closures complete in submission order.
pub struct MainLoop {
    id: Uuid,
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Work>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MainLoop {
    /// Start the loop on a new OS thread called `name`.
    pub fn spawn(name: impl Into<String>) -> Result<Self, ContextError> {
        let name = name.into();
        let id = Uuid::new_v4();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ContextError::Startup {
                name: name.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || drive(id, runtime, rx))
            .map_err(|source| ContextError::Startup {
                name: name.clone(),
                source,
            })?;

        tracing::info!(name = %name, "Main loop started");

        Ok(Self {
            id,
            name,
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Close the loop and wait until everything already queued has run.
    ///
    /// Returns immediately when called from the loop itself.
    pub fn join(&self) -> Result<(), ContextError> {
        self.shutdown();

        let Some(handle) = lock(&self.thread).take() else {
            return Ok(());
        };
        if handle.thread().id() == std::thread::current().id() {
            return Ok(());
        }
        handle.join().map_err(|_| ContextError::Panicked {
            name: self.name.clone(),
        })
    }
}

fn drive(id: Uuid, runtime: Runtime, mut rx: mpsc::UnboundedReceiver<Work>) {
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        while let Some(work) = rx.recv().await {
            tokio::task::spawn_local(scoped(id, work));
        }
    });
    // Channel closed: finish whatever was spawned before that.
    runtime.block_on(local);
    tracing::debug!(executor = %id, "Main loop drained");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Executor for MainLoop {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, work: Work) -> Result<(), Rejected> {
        let closed = || ContextError::Closed {
            name: self.name.clone(),
        };
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(work).map_err(|e| Rejected::new(closed(), e.0)),
            None => Err(Rejected::new(closed(), work)),
        }
    }

    fn shutdown(&self) {
        if lock(&self.tx).take().is_some() {
            tracing::info!(name = %self.name, "Main loop closed to new work");
        }
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        // Detach: the thread exits once queued work is done.
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::current_executor;

    #[test]
    fn preserves_submission_order() {
        let main = MainLoop::spawn("test-main-order").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            main.submit(Box::pin(async move {
                seen.lock().unwrap().push(i);
            }))
            .unwrap();
        }
        main.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn runs_on_its_own_thread() {
        let main = MainLoop::spawn("test-main-thread").unwrap();
        let id = main.id();
        let (tx, rx) = std::sync::mpsc::channel();

        main.submit(Box::pin(async move {
            let name = std::thread::current().name().map(str::to_string);
            let _ = tx.send((name, current_executor() == Some(id)));
        }))
        .unwrap();

        let (name, current) = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("test-main-thread"));
        assert!(current);
        assert!(!main.is_current());
    }

    #[test]
    fn rejects_after_shutdown_and_returns_work() {
        let main = MainLoop::spawn("test-main-closed").unwrap();
        main.join().unwrap();

        let rejected = main.submit(Box::pin(async {})).unwrap_err();
        let (error, _work) = rejected.into_parts();
        assert!(matches!(error, ContextError::Closed { .. }));
    }
}
