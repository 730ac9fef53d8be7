//! Lifecycle engine shared by the launch and async families.
//!
//! ```text
//! initially (caller thread) → submit → body → finally
//!                                        ↘ on_error → finally   (failure)
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use tokio::sync::oneshot;

use crate::context::{Executor, Work};
use crate::dispatcher::Dispatcher;
use crate::dispatcher::router::{FailureRouter, TaskMeta, kind_of};
use crate::error::TaskError;
use crate::task::handle::{StateTracker, track};
use crate::task::{ErrorHook, FailureRoute, Hook, JobHandle, TaskRequest, TaskState};

/// Reason a submission was refused, read by the work when it runs inline.
#[derive(Clone, Default)]
pub(crate) struct RejectionSlot(Arc<OnceLock<TaskError>>);

impl RejectionSlot {
    pub(crate) fn get(&self) -> Option<TaskError> {
        self.0.get().cloned()
    }
}

/// Submit `work`; if the executor refuses, abort it and drive it to its
/// terminal state on the calling thread.
pub(crate) fn submit_or_settle(
    executor: &dyn Executor,
    task: TaskMeta,
    work: Work,
    abort: &AbortHandle,
    rejection: &RejectionSlot,
) {
    match executor.submit(work) {
        Ok(()) => {
            tracing::debug!(task_id = %task.id, context = %task.context, "Task submitted");
        }
        Err(rejected) => {
            let (error, work) = rejected.into_parts();
            tracing::warn!(
                task_id = %task.id,
                context = %task.context,
                error = %error,
                "Submission rejected, settling task on caller thread"
            );
            let _ = rejection.0.set(error.into());
            abort.abort();
            futures::executor::block_on(work);
        }
    }
}

/// Run `initially`, then submit the body and its hooks to the request's context.
pub(crate) fn spawn<T, F, Fut>(
    dispatcher: &Dispatcher,
    request: TaskRequest,
    body: F,
    result_tx: Option<oneshot::Sender<Result<T, TaskError>>>,
) -> JobHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let TaskRequest {
        context,
        initially,
        on_error,
        finally,
        route,
    } = request;
    let task = TaskMeta::new(context);

    if let Some(initially) = initially {
        initially();
    }

    let (abort, registration) = AbortHandle::new_pair();
    let (tracker, handle) = track(task.id, context, abort.clone());
    let rejection = RejectionSlot::default();

    let lifecycle = Lifecycle {
        task,
        route,
        on_error,
        finally,
        tracker,
        result_tx,
        router: dispatcher.router(),
        rejection: rejection.clone(),
    };
    let work: Work = Box::pin(lifecycle.run(body, registration));

    submit_or_settle(
        dispatcher.executor(context).as_ref(),
        task,
        work,
        &abort,
        &rejection,
    );
    handle
}

struct Lifecycle<T> {
    task: TaskMeta,
    route: FailureRoute,
    on_error: Option<ErrorHook>,
    finally: Option<Hook>,
    tracker: StateTracker,
    result_tx: Option<oneshot::Sender<Result<T, TaskError>>>,
    router: FailureRouter,
    rejection: RejectionSlot,
}

impl<T: Send + 'static> Lifecycle<T> {
    async fn run<F, Fut>(self, body: F, registration: AbortRegistration)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let tracker = &self.tracker;
        let started = async move {
            tracker.advance(TaskState::Running);
            AssertUnwindSafe(async move { body().await })
                .catch_unwind()
                .await
        };

        let outcome = match Abortable::new(started, registration).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(TaskError::failed(err)),
            Ok(Err(payload)) => Err(TaskError::panicked(payload)),
            Err(_aborted) => Err(self.rejection.get().unwrap_or(TaskError::Cancelled)),
        };

        let Lifecycle {
            task,
            route,
            on_error,
            finally,
            tracker,
            result_tx,
            router,
            ..
        } = self;

        // Classify before awaiting so no borrow of `outcome` spans the hooks.
        let (terminal, failure) = match &outcome {
            Ok(_) => (TaskState::Completed, None),
            Err(TaskError::Cancelled) => (TaskState::Cancelled, None),
            Err(error) => (TaskState::Failed, Some(error.clone())),
        };

        // Set when the failure already has a home: an `on_error` hook or an
        // early report because the handle was gone before the hooks ran.
        let mut delivered = true;
        match failure {
            None => {
                tracing::debug!(task_id = %task.id, state = %terminal, "Task body settled");
                router.finish(task, route, finally).await;
            }
            Some(error) => {
                tracing::debug!(task_id = %task.id, error = %error, "Task body failed");
                let unobserved = result_tx.as_ref().is_none_or(oneshot::Sender::is_closed);
                delivered = on_error.is_some() || unobserved;
                router
                    .fail(task, route, error, on_error, finally, unobserved)
                    .await;
            }
        }

        tracker.advance(terminal);
        if let Some(tx) = result_tx {
            // Handle dropped while the hooks ran: the failure must still surface.
            if let Err(Err(error)) = tx.send(outcome) {
                if !delivered {
                    router
                        .failures()
                        .report(task.id, task.context, kind_of(&error), &error);
                }
            }
        }
    }
}
