//! Actor handles
//!
//! Handles are weak, generational references into the [`World`](super::World).
//! A handle whose actor has been destroyed or reclaimed stays a valid value
//! but fails every validity check; it is never reused for a different actor.

use hecs::Entity;

/// Weak reference to an actor in a [`World`](super::World)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorHandle(Entity);

impl ActorHandle {
    #[inline]
    pub(crate) const fn from_entity(entity: Entity) -> Self {
        Self(entity)
    }

    #[inline]
    pub(crate) const fn entity(self) -> Entity {
        self.0
    }

    /// Slot index of the actor (reused across generations)
    #[must_use]
    #[inline]
    pub fn index(self) -> u32 {
        self.0.id()
    }

    /// Stable bit representation, unique per actor generation
    #[must_use]
    #[inline]
    pub fn to_bits(self) -> u64 {
        self.0.to_bits().get()
    }
}

impl std::fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Actor({:?})", self.0)
    }
}
