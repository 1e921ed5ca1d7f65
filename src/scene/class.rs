//! Actor class descriptors
//!
//! An [`ActorClass`] is the unit of pool identity: every pool manages exactly
//! one class, and every actor remembers the class it was spawned from.
//! Classes are cheap to clone (`Arc` inside) and compare by a process-unique
//! id, so two classes with the same name are still distinct.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::lifecycle::Poolable;

/// Global counter for generating unique class IDs
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Factory producing a fresh lifecycle handler for each spawned actor
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Poolable> + Send + Sync>;

/// Broad category of an actor class.
///
/// Drives default pool sizing and memory estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClassKind {
    /// Plain scene actor
    #[default]
    Actor,
    /// Controllable actor
    Pawn,
    /// Pawn with a full movement/animation component set
    Character,
}

impl ClassKind {
    /// Multiplier applied to the per-component memory estimate
    #[must_use]
    pub const fn component_factor(self) -> u64 {
        match self {
            Self::Character => 10,
            Self::Pawn => 5,
            Self::Actor => 2,
        }
    }
}

struct ClassInfo {
    id: u64,
    name: String,
    kind: ClassKind,
    structure_size: u64,
    parent: Option<ActorClass>,
    has_root_primitive: bool,
    collision_by_default: bool,
    tick_by_default: bool,
    is_abstract: bool,
    handler_factory: Option<HandlerFactory>,
}

/// Shared descriptor of an actor class
#[derive(Clone)]
pub struct ActorClass {
    inner: Arc<ClassInfo>,
}

impl ActorClass {
    /// Unique class id
    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Class name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Class category
    #[must_use]
    #[inline]
    pub fn kind(&self) -> ClassKind {
        self.inner.kind
    }

    /// Size in bytes of the actor's own data
    #[must_use]
    #[inline]
    pub fn structure_size(&self) -> u64 {
        self.inner.structure_size
    }

    /// Parent class, if any
    #[must_use]
    pub fn parent(&self) -> Option<&ActorClass> {
        self.inner.parent.as_ref()
    }

    /// Check whether this class is `other` or derives from it
    #[must_use]
    pub fn is_a(&self, other: &ActorClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class == other {
                return true;
            }
            current = class.parent();
        }
        false
    }

    /// Whether actors of this class carry a physics root primitive
    #[must_use]
    #[inline]
    pub fn has_root_primitive(&self) -> bool {
        self.inner.has_root_primitive
    }

    /// Collision state restored on activation
    #[must_use]
    #[inline]
    pub fn collision_by_default(&self) -> bool {
        self.inner.collision_by_default
    }

    /// Tick state restored on activation
    #[must_use]
    #[inline]
    pub fn tick_by_default(&self) -> bool {
        self.inner.tick_by_default
    }

    /// Abstract classes cannot be spawned
    #[must_use]
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.inner.is_abstract
    }

    /// Whether spawned actors receive a lifecycle handler
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.inner.handler_factory.is_some()
    }

    /// Build a new handler instance for a freshly spawned actor
    #[must_use]
    pub fn create_handler(&self) -> Option<Box<dyn Poolable>> {
        self.inner.handler_factory.as_ref().map(|factory| factory())
    }
}

impl PartialEq for ActorClass {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ActorClass {}

impl Hash for ActorClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for ActorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorClass")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for ActorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// Builder for [`ActorClass`]
///
/// # Example
///
/// ```ignore
/// let bullet = ClassBuilder::new("Bullet")
///     .with_structure_size(256)
///     .with_root_primitive(true)
///     .with_handler(BulletHandler::default)
///     .build();
/// ```
pub struct ClassBuilder {
    name: String,
    kind: Option<ClassKind>,
    structure_size: u64,
    parent: Option<ActorClass>,
    has_root_primitive: bool,
    collision_by_default: bool,
    tick_by_default: bool,
    is_abstract: bool,
    handler_factory: Option<HandlerFactory>,
}

impl ClassBuilder {
    /// Default size of an actor's own data
    pub const DEFAULT_STRUCTURE_SIZE: u64 = 512;

    /// Start describing a class
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            structure_size: Self::DEFAULT_STRUCTURE_SIZE,
            parent: None,
            has_root_primitive: false,
            collision_by_default: true,
            tick_by_default: true,
            is_abstract: false,
            handler_factory: None,
        }
    }

    /// Set the class category
    #[must_use]
    pub fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the size of the actor's own data
    #[must_use]
    pub fn with_structure_size(mut self, bytes: u64) -> Self {
        self.structure_size = bytes;
        self
    }

    /// Derive from a parent class.
    ///
    /// Kind, root primitive and handler are inherited unless set explicitly.
    #[must_use]
    pub fn with_parent(mut self, parent: &ActorClass) -> Self {
        self.has_root_primitive |= parent.has_root_primitive();
        if self.handler_factory.is_none() {
            self.handler_factory = parent.inner.handler_factory.clone();
        }
        self.parent = Some(parent.clone());
        self
    }

    /// Give actors a physics root primitive
    #[must_use]
    pub fn with_root_primitive(mut self, enabled: bool) -> Self {
        self.has_root_primitive = enabled;
        self
    }

    /// Collision state restored on activation
    #[must_use]
    pub fn with_collision(mut self, enabled: bool) -> Self {
        self.collision_by_default = enabled;
        self
    }

    /// Tick state restored on activation
    #[must_use]
    pub fn with_tick(mut self, enabled: bool) -> Self {
        self.tick_by_default = enabled;
        self
    }

    /// Mark the class abstract (not spawnable)
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Attach a lifecycle handler factory
    #[must_use]
    pub fn with_handler<F, P>(mut self, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Poolable,
    {
        self.handler_factory = Some(Arc::new(move || Box::new(factory()) as Box<dyn Poolable>));
        self
    }

    /// Finish the class
    #[must_use]
    pub fn build(self) -> ActorClass {
        let kind = self
            .kind
            .or_else(|| self.parent.as_ref().map(ActorClass::kind))
            .unwrap_or_default();

        ActorClass {
            inner: Arc::new(ClassInfo {
                id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
                name: self.name,
                kind,
                structure_size: self.structure_size,
                parent: self.parent,
                has_root_primitive: self.has_root_primitive,
                collision_by_default: self.collision_by_default,
                tick_by_default: self.tick_by_default,
                is_abstract: self.is_abstract,
                handler_factory: self.handler_factory,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_identity_is_by_id() {
        let a = ClassBuilder::new("Bullet").build();
        let b = ClassBuilder::new("Bullet").build();

        assert_eq!(a, a.clone());
        assert_ne!(a, b, "Same name must not imply same class");
    }

    #[test]
    fn test_is_a_walks_parent_chain() {
        let pawn = ClassBuilder::new("Pawn").with_kind(ClassKind::Pawn).build();
        let character = ClassBuilder::new("Character")
            .with_parent(&pawn)
            .with_kind(ClassKind::Character)
            .build();
        let hero = ClassBuilder::new("Hero").with_parent(&character).build();

        assert!(hero.is_a(&pawn));
        assert!(hero.is_a(&hero));
        assert!(!pawn.is_a(&hero));
        assert_eq!(hero.kind(), ClassKind::Character, "Kind is inherited");
    }

    #[test]
    fn test_component_factor() {
        assert_eq!(ClassKind::Character.component_factor(), 10);
        assert_eq!(ClassKind::Pawn.component_factor(), 5);
        assert_eq!(ClassKind::Actor.component_factor(), 2);
    }
}
