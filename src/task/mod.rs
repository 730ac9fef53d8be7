//! Task types — requests, handles and the lifecycle state machine.

pub mod handle;
pub mod request;
pub mod state;

pub use handle::{JobHandle, TaskHandle};
pub use request::{ErrorHook, FailureRoute, Hook, TaskRequest};
pub use state::TaskState;
