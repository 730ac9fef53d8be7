//! Dispatcher — the public launch surface.
//!
//! Core components:
//! - `engine` — lifecycle driver (initially → body → on_error/finally)
//! - `router` — where failure hooks run (same context or main)
//! - `delay` — delayed execution with cancellation
//! - `bridge` — `on_main` / `on_main_blocking` hops

mod bridge;
mod delay;
mod engine;
mod router;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};

use crate::config::DispatcherConfig;
use crate::context::{BackgroundPool, Context, Executor, MainLoop};
use crate::error::{Result, TaskError};
use crate::failure::{FailureChannel, FailureReport};
use crate::task::{JobHandle, TaskHandle, TaskRequest};

use self::router::FailureRouter;

/// Launches tasks on the background or main context with lifecycle hooks.
///
/// Cheap to clone. Holds no per-task state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    background: Arc<dyn Executor>,
    main: Arc<dyn Executor>,
    failures: FailureChannel,
}

impl Dispatcher {
    /// Build on host-supplied executors.
    pub fn new(background: Arc<dyn Executor>, main: Arc<dyn Executor>) -> Self {
        Self::with_failures(background, main, FailureChannel::default())
    }

    /// Build on host-supplied executors, reporting into `failures`.
    pub fn with_failures(
        background: Arc<dyn Executor>,
        main: Arc<dyn Executor>,
        failures: FailureChannel,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                background,
                main,
                failures,
            }),
        }
    }

    /// Start the reference executors described by `config`.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        let background = BackgroundPool::new(
            config.background_workers,
            config.background_thread_name.clone(),
        )?;
        let main = MainLoop::spawn(config.main_thread_name.clone())?;
        Ok(Self::with_failures(
            Arc::new(background),
            Arc::new(main),
            FailureChannel::new(config.failure_capacity),
        ))
    }

    /// Executor backing `context`.
    pub fn executor(&self, context: Context) -> &Arc<dyn Executor> {
        match context {
            Context::Background => &self.inner.background,
            Context::Main => &self.inner.main,
        }
    }

    /// Whether the calling task runs on `context`.
    pub fn is_current(&self, context: Context) -> bool {
        self.executor(context).is_current()
    }

    /// Receive reports of failures nobody handled.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<FailureReport> {
        self.inner.failures.subscribe()
    }

    /// Stop both executors from accepting new work.
    pub fn shutdown(&self) {
        self.inner.background.shutdown();
        self.inner.main.shutdown();
    }

    pub(crate) fn router(&self) -> FailureRouter {
        FailureRouter::new(Arc::clone(&self.inner.main), self.inner.failures.clone())
    }

    // ── launch ──────────────────────────────────────────────────────────

    /// Fire-and-forget. `initially` runs now on this thread, the body on
    /// the request's context, hooks where the request routes them.
    pub fn launch<T, F, Fut>(&self, request: TaskRequest, body: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        engine::spawn(self, request, body, None)
    }

    /// [`launch`](Self::launch) with `on_error`/`finally` forced onto main.
    pub fn launch_handle_on_main<T, F, Fut>(&self, request: TaskRequest, body: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.launch(request.handle_on_main(), body)
    }

    /// [`launch`](Self::launch) for bodies that may produce nothing.
    pub fn launch_optional<T, F, Fut>(&self, request: TaskRequest, body: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
        T: Send + 'static,
    {
        self.launch(request, body)
    }

    /// [`launch_optional`](Self::launch_optional) with hooks forced onto main.
    pub fn launch_optional_handle_on_main<T, F, Fut>(
        &self,
        request: TaskRequest,
        body: F,
    ) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
        T: Send + 'static,
    {
        self.launch(request.handle_on_main(), body)
    }

    // ── async ───────────────────────────────────────────────────────────

    /// Like [`launch`](Self::launch) but the handle resolves to the body's value.
    ///
    /// On failure the handle carries the error *and* `on_error` runs; the
    /// handle resolves only after the hooks finished.
    pub fn async_task<T, F, Fut>(&self, request: TaskRequest, body: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = engine::spawn(self, request, body, Some(tx));
        TaskHandle::new(job, rx)
    }

    /// [`async_task`](Self::async_task) with `on_error`/`finally` forced onto main.
    pub fn async_task_handle_on_main<T, F, Fut>(
        &self,
        request: TaskRequest,
        body: F,
    ) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.async_task(request.handle_on_main(), body)
    }

    /// [`async_task`](Self::async_task) for bodies that may produce nothing.
    pub fn async_optional<T, F, Fut>(&self, request: TaskRequest, body: F) -> TaskHandle<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
        T: Send + 'static,
    {
        self.async_task(request, body)
    }

    /// [`async_optional`](Self::async_optional) with hooks forced onto main.
    pub fn async_optional_handle_on_main<T, F, Fut>(
        &self,
        request: TaskRequest,
        body: F,
    ) -> TaskHandle<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
        T: Send + 'static,
    {
        self.async_task(request.handle_on_main(), body)
    }

    // ── main bridge ─────────────────────────────────────────────────────

    /// Run `action` on main and suspend until it returns.
    pub async fn on_main<T, F>(&self, action: F) -> std::result::Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        bridge::run_on(self.inner.main.as_ref(), action).await
    }

    /// Run `action` on main and block this thread until it returns.
    ///
    /// For code outside any task. Calling it from work that main is itself
    /// waiting on deadlocks.
    pub fn on_main_blocking<T, F>(&self, action: F) -> std::result::Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        bridge::run_on_blocking(self.inner.main.as_ref(), action)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("background", &self.inner.background.name())
            .field("main", &self.inner.main.name())
            .finish()
    }
}
