//! Task request — context choice plus optional lifecycle hooks.

use std::fmt;

use crate::context::Context;
use crate::error::TaskError;

/// Hook run with no arguments (`finally`).
pub type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Hook receiving the body failure (`on_error`).
pub type ErrorHook = Box<dyn FnOnce(TaskError) + Send + 'static>;

/// Where `on_error` and `finally` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureRoute {
    /// Whatever context the body ran in.
    #[default]
    SameContext,
    /// Always on the main context.
    Main,
}

/// Configuration for one launch.
///
/// All hooks are optional; an absent hook is a no-op. `initially` runs on the
/// caller's thread before submission, so it does not have to be `Send`.
#[derive(Default)]
pub struct TaskRequest {
    pub(crate) context: Context,
    pub(crate) initially: Option<Box<dyn FnOnce() + 'static>>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) finally: Option<Hook>,
    pub(crate) route: FailureRoute,
}

impl TaskRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the body on `context`.
    pub fn on(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn initially(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.initially = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn finally(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.finally = Some(Box::new(hook));
        self
    }

    /// Run `on_error` and `finally` on the main context.
    pub fn handle_on_main(mut self) -> Self {
        self.route = FailureRoute::Main;
        self
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn route(&self) -> FailureRoute {
        self.route
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("context", &self.context)
            .field("initially", &self.initially.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("finally", &self.finally.is_some())
            .field("route", &self.route)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let request = TaskRequest::new();
        assert_eq!(request.context(), Context::Background);
        assert_eq!(request.route(), FailureRoute::SameContext);
        assert!(request.initially.is_none());
        assert!(request.on_error.is_none());
        assert!(request.finally.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let request = TaskRequest::new()
            .on(Context::Main)
            .initially(|| {})
            .on_error(|_| {})
            .finally(|| {})
            .handle_on_main();

        assert_eq!(request.context(), Context::Main);
        assert_eq!(request.route(), FailureRoute::Main);
        let debug = format!("{request:?}");
        assert!(debug.contains("on_error: true"));
        assert!(debug.contains("finally: true"));
    }
}
