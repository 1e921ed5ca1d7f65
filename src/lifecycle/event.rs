//! Lifecycle events and the handler trait pooled actors implement

use serde::{Deserialize, Serialize};

use crate::scene::{ActorHandle, SpawnParams};

/// Events delivered to pooled actors as they move through the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// First activation after construction completed
    Created,
    /// Handed to a caller
    Activated,
    /// Taken back by the pool
    ReturnedToPool,
    /// Destroyed by the pool. Recorded for statistics, never delivered.
    Destroyed,
}

impl LifecycleEvent {
    /// Events that reach handlers, in delivery order
    pub const DISPATCHABLE: [Self; 3] = [Self::Created, Self::Activated, Self::ReturnedToPool];

    /// Whether handlers can receive this event
    #[must_use]
    #[inline]
    pub const fn is_dispatchable(self) -> bool {
        !matches!(self, Self::Destroyed)
    }

    /// Position in [`Self::DISPATCHABLE`]
    #[must_use]
    pub(crate) const fn index(self) -> Option<usize> {
        match self {
            Self::Created => Some(0),
            Self::Activated => Some(1),
            Self::ReturnedToPool => Some(2),
            Self::Destroyed => None,
        }
    }

    /// Call the matching handler method; `None` for non-dispatchable events
    pub(crate) fn invoke(
        self,
        handler: &mut dyn Poolable,
        actor: ActorHandle,
    ) -> Option<HandlerResult> {
        match self {
            Self::Created => Some(handler.on_created(actor)),
            Self::Activated => Some(handler.on_activated(actor)),
            Self::ReturnedToPool => Some(handler.on_returned(actor)),
            Self::Destroyed => None,
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Activated => "Activated",
            Self::ReturnedToPool => "ReturnedToPool",
            Self::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

/// Failure reported by a lifecycle handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Result returned by lifecycle handler methods
pub type HandlerResult = Result<(), HandlerError>;

/// Per-actor lifecycle handler.
///
/// Every method has a no-op default, so a handler only implements what it
/// cares about. Handlers run on the thread that triggered the event (or on
/// the simulation thread for asynchronous dispatch) with no pool or world
/// lock held. A handler may use *other* pools; re-entering the pool that is
/// dispatching to it is refused.
///
/// # Example
///
/// ```ignore
/// struct Bullet { damage: i64 }
///
/// impl Poolable for Bullet {
///     fn construct(&mut self, _actor: ActorHandle, params: &SpawnParams) {
///         self.damage = params.int("damage").unwrap_or(10);
///     }
///
///     fn on_returned(&mut self, _actor: ActorHandle) -> HandlerResult {
///         self.damage = 0;
///         Ok(())
///     }
/// }
/// ```
pub trait Poolable: Send + 'static {
    /// First activation after construction completed
    fn on_created(&mut self, _actor: ActorHandle) -> HandlerResult {
        Ok(())
    }

    /// Handed out by the pool
    fn on_activated(&mut self, _actor: ActorHandle) -> HandlerResult {
        Ok(())
    }

    /// Taken back by the pool, before the actor is hidden and parked
    fn on_returned(&mut self, _actor: ActorHandle) -> HandlerResult {
        Ok(())
    }

    /// Construction script. Runs when construction finishes and again on every reuse.
    fn construct(&mut self, _actor: ActorHandle, _params: &SpawnParams) {}

    /// Whether this handler wants `event`. Queried once per class and cached.
    fn handles(&self, _event: LifecycleEvent) -> bool {
        true
    }
}
