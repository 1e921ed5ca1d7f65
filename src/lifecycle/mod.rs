//! Lifecycle events delivered to pooled actors

pub mod dispatcher;
pub mod event;

pub use dispatcher::{DEFAULT_TIMEOUT, DispatchMode, LifecycleDispatcher, LifecycleStats};
pub(crate) use dispatcher::LifecycleState;
pub use event::{HandlerError, HandlerResult, LifecycleEvent, Poolable};
