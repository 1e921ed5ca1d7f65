//! Pooled scene-actor lifecycle management
//!
//! This crate provides:
//! - Per-class actor pools with never-fail acquire and a hard residency limit
//! - Lifecycle events (created / activated / returned) delivered to user handlers
//! - Strategy-driven background preallocation under a memory budget
//! - Memory and health analysis of running pools
//! - A small scene host (hecs-backed world, classes, garbage collector) the
//!   pools run against

pub mod advisor;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod prealloc;
pub mod scene;

#[cfg(test)]
mod testing;

pub use error::{PoolError, PoolResult};

// Re-exports for convenience
pub use glam;
pub use hecs;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::advisor::{MemoryAdvisor, OptimizationStrategy};
    pub use crate::error::{PoolError, PoolResult};
    pub use crate::lifecycle::{DispatchMode, HandlerError, HandlerResult, LifecycleEvent, Poolable};
    pub use crate::pool::{ActorPool, PoolConfig, PoolPreset, PoolRegistry, PoolStats, RegistryConfig};
    pub use crate::prealloc::{PreallocConfig, PreallocStrategy};
    pub use crate::scene::{
        ActorClass, ActorHandle, ClassBuilder, ClassKind, GarbageCollector, SpawnParams,
        SpawnValue, Transform, Velocity, World,
    };
    pub use glam::{Quat, Vec3};
}
