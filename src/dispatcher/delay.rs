//! Delay scheduler.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable};

use crate::context::{Context, Work};
use crate::dispatcher::Dispatcher;
use crate::dispatcher::bridge::run_on;
use crate::dispatcher::engine::{RejectionSlot, submit_or_settle};
use crate::dispatcher::router::TaskMeta;
use crate::error::TaskError;
use crate::failure::FailureKind;
use crate::task::{JobHandle, TaskState};

#[derive(Debug, Clone, Copy)]
enum Hop {
    Stay,
    Main,
}

impl Dispatcher {
    /// Call `body` on `context` once at least `delay` has elapsed.
    ///
    /// Cancelling the handle before the delay elapses means `body` never
    /// runs. Once the delay elapsed the body runs to completion.
    pub fn delay<T, F>(&self, context: Context, delay: Duration, body: F) -> JobHandle
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_delayed(context, delay, Hop::Stay, body)
    }

    /// Wait on `context`, then hop to main and call `body` there.
    pub fn delay_then_call_on_main<T, F>(&self, context: Context, delay: Duration, body: F) -> JobHandle
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_delayed(context, delay, Hop::Main, body)
    }

    /// [`delay`](Self::delay) on the default context (Background).
    pub fn delay_in_background<T, F>(&self, delay: Duration, body: F) -> JobHandle
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.delay(Context::default(), delay, body)
    }

    /// [`delay_then_call_on_main`](Self::delay_then_call_on_main) waiting on
    /// the default context (Background).
    pub fn delay_in_background_then_call_on_main<T, F>(&self, delay: Duration, body: F) -> JobHandle
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.delay_then_call_on_main(Context::default(), delay, body)
    }

    fn schedule_delayed<T, F>(&self, context: Context, delay: Duration, hop: Hop, body: F) -> JobHandle
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let task = TaskMeta::new(context);
        let (abort, registration) = AbortHandle::new_pair();
        let (tracker, handle) = crate::task::handle::track(task.id, context, abort.clone());
        let rejection = RejectionSlot::default();
        let router = self.router();

        let pending = rejection.clone();
        let work: Work = Box::pin(async move {
            // Timer is created on first poll, so a settled rejection never needs a runtime.
            let elapsed = async move { tokio::time::sleep(delay).await };
            if Abortable::new(elapsed, registration).await.is_err() {
                if let Some(error) = pending.get() {
                    router
                        .failures()
                        .report(task.id, context, FailureKind::Routing, &error);
                    tracker.advance(TaskState::Failed);
                } else {
                    tracing::debug!(task_id = %task.id, "Delayed task cancelled before firing");
                    tracker.advance(TaskState::Cancelled);
                }
                return;
            }

            tracker.advance(TaskState::Running);
            let ran_on = match hop {
                Hop::Stay => context,
                Hop::Main => Context::Main,
            };
            let call = move || catch_unwind(AssertUnwindSafe(body)).map(drop);
            let result = match hop {
                Hop::Stay => call().map_err(TaskError::panicked),
                Hop::Main => match run_on(router.main().as_ref(), call).await {
                    Ok(called) => called.map_err(TaskError::panicked),
                    Err(routing) => Err(routing),
                },
            };

            match result {
                Ok(()) => {
                    tracker.advance(TaskState::Completed);
                }
                Err(error) => {
                    let kind = if error.is_routing() {
                        FailureKind::Routing
                    } else {
                        FailureKind::Body
                    };
                    router.failures().report(task.id, ran_on, kind, &error);
                    tracker.advance(TaskState::Failed);
                }
            }
        });

        submit_or_settle(self.executor(context).as_ref(), task, work, &abort, &rejection);
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::sync::oneshot;

    use super::*;
    use crate::config::DispatcherConfig;

    fn dispatcher() -> Dispatcher {
        Dispatcher::from_config(&DispatcherConfig::default().with_background_workers(2)).unwrap()
    }

    #[tokio::test]
    async fn background_overload_runs_on_background() {
        let d = dispatcher();
        let checker = d.clone();
        let (tx, rx) = oneshot::channel();
        let submitted = Instant::now();

        let job = d.delay_in_background(Duration::from_millis(50), move || {
            let _ = tx.send((checker.is_current(Context::Background), submitted.elapsed()));
        });

        let (on_background, elapsed) = rx.await.unwrap();
        assert!(on_background);
        assert!(elapsed >= Duration::from_millis(50));
        assert_eq!(job.context(), Context::Background);
        assert_eq!(job.join().await, TaskState::Completed);
    }

    #[tokio::test]
    async fn background_overload_hops_to_main() {
        let d = dispatcher();
        let checker = d.clone();
        let (tx, rx) = oneshot::channel();

        let job = d.delay_in_background_then_call_on_main(Duration::from_millis(10), move || {
            let _ = tx.send(checker.is_current(Context::Main));
        });

        assert!(rx.await.unwrap());
        assert_eq!(job.context(), Context::Background);
        assert_eq!(job.join().await, TaskState::Completed);
    }

    #[tokio::test]
    async fn shut_down_context_settles_as_failed() {
        let d = dispatcher();
        d.shutdown();

        let job = d.delay_in_background(Duration::from_millis(10), || ());
        assert_eq!(job.state(), TaskState::Failed);
    }
}
