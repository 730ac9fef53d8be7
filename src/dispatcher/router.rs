//! Failure router — decides where `on_error` and `finally` run.

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::context::{Context, Executor, Work};
use crate::error::TaskError;
use crate::failure::{FailureChannel, FailureKind};
use crate::task::{ErrorHook, FailureRoute, Hook};

/// Identity of the task whose hooks are being routed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskMeta {
    pub id: Uuid,
    pub context: Context,
}

impl TaskMeta {
    pub(crate) fn new(context: Context) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
        }
    }
}

#[derive(Clone)]
pub(crate) struct FailureRouter {
    main: Arc<dyn Executor>,
    failures: FailureChannel,
}

impl FailureRouter {
    pub(crate) fn new(main: Arc<dyn Executor>, failures: FailureChannel) -> Self {
        Self { main, failures }
    }

    pub(crate) fn main(&self) -> &Arc<dyn Executor> {
        &self.main
    }

    pub(crate) fn failures(&self) -> &FailureChannel {
        &self.failures
    }

    /// Success or cancellation path: only `finally` runs.
    pub(crate) async fn finish(&self, task: TaskMeta, route: FailureRoute, finally: Option<Hook>) {
        if let Some(finally) = finally {
            self.dispatch(task, route, finally).await;
        }
    }

    /// Failure path: `on_error` then `finally`, on one context.
    ///
    /// Without `on_error` the failure goes to the failure channel when
    /// nobody else can observe it.
    pub(crate) async fn fail(
        &self,
        task: TaskMeta,
        route: FailureRoute,
        error: TaskError,
        on_error: Option<ErrorHook>,
        finally: Option<Hook>,
        unobserved: bool,
    ) {
        if on_error.is_none() && unobserved {
            self.failures
                .report(task.id, task.context, kind_of(&error), &error);
        }
        if on_error.is_none() && finally.is_none() {
            return;
        }

        let hooks: Hook = Box::new(move || {
            if let Some(on_error) = on_error {
                on_error(error);
            }
            if let Some(finally) = finally {
                finally();
            }
        });
        self.dispatch(task, route, hooks).await;
    }

    /// Run `hooks` where `route` says.
    ///
    /// Hook panics are not caught on the same-context path. On Main the
    /// panic is reported as [`FailureKind::Hook`] and then resumed, so it
    /// still unwinds the main-loop task that ran it.
    async fn dispatch(&self, task: TaskMeta, route: FailureRoute, hooks: Hook) {
        if route == FailureRoute::SameContext || self.main.is_current() {
            hooks();
            return;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let work: Work = Box::pin(async move {
            match catch_unwind(AssertUnwindSafe(hooks)) {
                Ok(()) => {
                    let _ = done_tx.send(Ok(()));
                }
                Err(payload) => {
                    let _ = done_tx.send(Err(TaskError::hook_panicked(payload.as_ref())));
                    resume_unwind(payload);
                }
            }
        });

        match self.main.submit(work) {
            Ok(()) => {
                // Suspend until main ran them so the task ends after its hooks.
                match done_rx.await {
                    Ok(Ok(())) => {}
                    Ok(Err(hook_error)) => {
                        self.failures
                            .report(task.id, Context::Main, FailureKind::Hook, &hook_error);
                    }
                    Err(_) => {
                        self.failures.report(
                            task.id,
                            Context::Main,
                            FailureKind::Routing,
                            &TaskError::Abandoned,
                        );
                    }
                }
            }
            Err(rejected) => {
                let (error, work) = rejected.into_parts();
                self.failures
                    .report(task.id, Context::Main, FailureKind::Routing, &error.into());
                tracing::warn!(task_id = %task.id, "Main rejected hooks, running them inline");
                work.await;
            }
        }
    }
}

pub(crate) fn kind_of(error: &TaskError) -> FailureKind {
    if error.is_routing() {
        FailureKind::Routing
    } else {
        FailureKind::Body
    }
}
