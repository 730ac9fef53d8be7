//! Caller-side handles for launched tasks.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as PollContext, Poll};

use futures::future::AbortHandle;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::context::Context;
use crate::error::TaskError;
use crate::task::state::TaskState;

/// Handle to a fire-and-forget task.
///
/// Dropping it does not cancel the task.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    context: Context,
    abort: AbortHandle,
    state: watch::Receiver<TaskState>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Context the body was submitted to.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Request cooperative cancellation.
    ///
    /// A body that has not started never starts; a running body stops at its
    /// next suspension point. `finally` still runs.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the task reaches a terminal state.
    ///
    /// If the executor dropped the task without finishing it, the last
    /// observed state is returned.
    pub async fn join(&self) -> TaskState {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(TaskState::is_terminal).await {
            return *state;
        }
        *rx.borrow()
    }
}

/// Handle to a result-producing task. Await it for the value.
#[derive(Debug)]
pub struct TaskHandle<T> {
    job: JobHandle,
    result: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(job: JobHandle, result: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { job, result }
    }

    pub fn id(&self) -> Uuid {
        self.job.id()
    }

    pub fn cancel(&self) {
        self.job.cancel();
    }

    pub fn state(&self) -> TaskState {
        self.job.state()
    }

    /// Lifecycle view shared with fire-and-forget tasks.
    pub fn job(&self) -> &JobHandle {
        &self.job
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

/// Engine-side writer for a task's state.
pub(crate) struct StateTracker {
    id: Uuid,
    tx: watch::Sender<TaskState>,
}

impl StateTracker {
    /// Move to `next` if the transition is valid. Returns whether it moved.
    pub(crate) fn advance(&self, next: TaskState) -> bool {
        let id = self.id;
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                tracing::debug!(task_id = %id, from = %state, to = %next, "Ignoring invalid transition");
                false
            }
        })
    }
}

/// Create the tracker/handle pair for a new task.
pub(crate) fn track(id: Uuid, context: Context, abort: AbortHandle) -> (StateTracker, JobHandle) {
    let (tx, rx) = watch::channel(TaskState::Created);
    let handle = JobHandle {
        id,
        context,
        abort,
        state: rx,
    };
    (StateTracker { id, tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (StateTracker, JobHandle, futures::future::AbortRegistration) {
        let (abort, registration) = AbortHandle::new_pair();
        let (tracker, handle) = track(Uuid::new_v4(), Context::Background, abort);
        (tracker, handle, registration)
    }

    #[test]
    fn tracker_rejects_invalid_transitions() {
        let (tracker, handle, _reg) = fresh();
        assert_eq!(handle.state(), TaskState::Created);

        assert!(!tracker.advance(TaskState::Completed));
        assert!(tracker.advance(TaskState::Running));
        assert!(tracker.advance(TaskState::Completed));
        assert!(!tracker.advance(TaskState::Failed));

        assert_eq!(handle.state(), TaskState::Completed);
        assert!(handle.is_finished());
    }

    #[test]
    fn cancel_sets_flag() {
        let (_tracker, handle, _reg) = fresh();
        assert!(!handle.is_cancel_requested());
        handle.cancel();
        assert!(handle.is_cancel_requested());
    }

    #[tokio::test]
    async fn join_waits_for_terminal_state() {
        let (tracker, handle, _reg) = fresh();

        tokio::spawn(async move {
            tracker.advance(TaskState::Running);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tracker.advance(TaskState::Failed);
        });

        assert_eq!(handle.join().await, TaskState::Failed);
    }

    #[tokio::test]
    async fn join_returns_last_state_when_dropped() {
        let (tracker, handle, _reg) = fresh();
        tracker.advance(TaskState::Running);
        drop(tracker);
        assert_eq!(handle.join().await, TaskState::Running);
    }

    #[tokio::test]
    async fn task_handle_abandoned_when_sender_dropped() {
        let (_tracker, job, _reg) = fresh();
        let (tx, rx) = oneshot::channel::<Result<u8, TaskError>>();
        let handle = TaskHandle::new(job, rx);
        drop(tx);
        assert!(matches!(handle.await, Err(TaskError::Abandoned)));
    }
}
