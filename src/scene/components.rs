//! Components attached to every spawned actor

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::class::ActorClass;
use crate::lifecycle::Poolable;

/// Transform component for position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor
    pub scale: Vec3,
}

impl Transform {
    /// Transform at the origin with unit scale
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a new transform at the origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with just a position
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Create a transform with position and rotation
    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Get the transformation matrix
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get the forward direction (negative Z in local space)
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Linear and angular velocity of a physics body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    /// Whether both velocities are exactly zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.linear == Vec3::ZERO && self.angular == Vec3::ZERO
    }
}

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Engine-side state of an actor
#[derive(Debug, Clone)]
pub struct ActorState {
    /// Class the actor was spawned from
    pub class: ActorClass,
    /// Rendered when true
    pub visible: bool,
    /// Receives per-frame updates when true
    pub tick_enabled: bool,
    /// False while spawned with deferred construction
    pub initialized: bool,
    /// Flagged for destruction; fails validity checks
    pub pending_kill: bool,
    /// Eligible for reclamation at the next collection
    pub unreachable: bool,
    /// Number of times the construction script has run
    pub construction_runs: u32,
}

impl ActorState {
    pub(crate) fn deferred(class: ActorClass) -> Self {
        Self {
            class,
            visible: false,
            tick_enabled: false,
            initialized: false,
            pending_kill: false,
            unreachable: false,
            construction_runs: 0,
        }
    }
}

/// Physics root primitive of an actor
#[derive(Debug, Clone, Copy, Default)]
pub struct RootPrimitive {
    pub collision_enabled: bool,
    pub simulate_physics: bool,
    pub velocity: Velocity,
}

/// Value passed to the construction script through spawn parameters
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec3),
}

/// Spawn parameters read by an actor's construction script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnParams(pub FxHashMap<String, SpawnValue>);

impl SpawnParams {
    /// Look up a parameter
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SpawnValue> {
        self.0.get(key)
    }

    /// Set a parameter, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: SpawnValue) -> Option<SpawnValue> {
        self.0.insert(key.into(), value)
    }

    /// Read an integer parameter
    #[must_use]
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(SpawnValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Lifecycle handler owned by an actor.
///
/// Cloned out of the world before invocation so no world lock is held while
/// user code runs.
#[derive(Clone)]
pub(crate) struct HandlerSlot(pub(crate) Arc<Mutex<Box<dyn Poolable>>>);

impl HandlerSlot {
    pub(crate) fn new(handler: Box<dyn Poolable>) -> Self {
        Self(Arc::new(Mutex::new(handler)))
    }
}
