//! Off-hot-path analysis of pool health and memory

mod health;
mod memory;
mod strategy;

pub use health::{
    MAX_UNUSED_RATIO, MIN_HEALTHY_HIT_RATE, health_description, is_pool_healthy,
    performance_suggestions,
};
pub use memory::{
    HIGH_USAGE, LARGE_POOL_BYTES, LOW_HIT_RATE, LOW_USAGE, MemoryAdvisor, MemoryStats,
    OptimizationStats, SHRINK_MIN_POOL_SIZE,
};
pub use strategy::{AdvisorConfig, OptimizationStrategy};
