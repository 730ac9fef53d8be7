//! Hops onto another executor: closure out, completion signal back.

use tokio::sync::oneshot;

use crate::context::Executor;
use crate::error::TaskError;

/// Run `action` on `executor` and suspend until it finishes.
///
/// Runs inline when the caller is already on `executor`.
pub(crate) async fn run_on<T, F>(executor: &dyn Executor, action: F) -> Result<T, TaskError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if executor.is_current() {
        return Ok(action());
    }
    let rx = send(executor, action)?;
    rx.await.map_err(|_| TaskError::Abandoned)
}

/// Like [`run_on`] but parks the calling thread instead of suspending.
pub(crate) fn run_on_blocking<T, F>(executor: &dyn Executor, action: F) -> Result<T, TaskError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if executor.is_current() {
        return Ok(action());
    }
    let rx = send(executor, action)?;
    futures::executor::block_on(rx).map_err(|_| TaskError::Abandoned)
}

fn send<T, F>(executor: &dyn Executor, action: F) -> Result<oneshot::Receiver<T>, TaskError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    executor
        .submit(Box::pin(async move {
            let _ = tx.send(action());
        }))
        .map_err(|rejected| TaskError::from(rejected.error))?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MainLoop;

    #[tokio::test]
    async fn run_on_returns_value_from_other_thread() {
        let main = MainLoop::spawn("bridge-main").unwrap();
        let name = run_on(&main, || std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("bridge-main"));
    }

    #[test]
    fn run_on_blocking_waits_for_completion() {
        let main = MainLoop::spawn("bridge-main-blocking").unwrap();
        let value = run_on_blocking(&main, || 40 + 2).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn closed_executor_is_unavailable() {
        let main = MainLoop::spawn("bridge-main-closed").unwrap();
        main.join().unwrap();
        let err = run_on_blocking(&main, || ()).unwrap_err();
        assert!(matches!(err, TaskError::ContextUnavailable { .. }));
    }

    #[test]
    fn panicking_action_is_abandoned() {
        let main = MainLoop::spawn("bridge-main-panic").unwrap();
        let err = run_on_blocking(&main, || -> u8 { panic!("main blew up") }).unwrap_err();
        assert!(matches!(err, TaskError::Abandoned));
    }
}
