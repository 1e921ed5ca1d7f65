//! Per-class actor pools and the registry that owns them

pub mod actor_pool;
pub mod config;
mod guard;
pub mod registry;
pub mod reset;
pub mod stats;

pub use actor_pool::{ActorPool, CLEANUP_FREQUENCY};
pub use config::{
    DEFAULT_HARD_LIMIT, DEFAULT_POOL_SIZE, MAX_INITIAL_SIZE, PoolConfig, PoolConfigEntry,
    PoolPreset, RegistryConfig, class_defaults,
};
pub use registry::{PREWARM_BATCH, PoolRegistry, RegistryStats};
pub use reset::POOL_PARKING_LOCATION;
pub use stats::{PoolStats, ResetStats};
