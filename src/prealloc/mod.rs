//! Background preallocation
//!
//! Fills a pool's free list ahead of demand according to a
//! [`PreallocStrategy`], spread over simulation ticks and bounded by an
//! optional memory budget.

mod config;
mod preallocator;
mod usage;

pub use config::{DEFAULT_MEMORY_BUDGET, PreallocConfig, PreallocStrategy};
pub use preallocator::{
    ADAPTIVE_MAX_PER_FRAME, Adjustment, MIN_PREDICTION_SAMPLES, PREDICTION_HEADROOM,
    PREDICTION_WINDOW, PreallocStats, Preallocator,
};
pub use usage::UsageHistory;
