//! Memory advisor
//!
//! Read-mostly analytics over an [`ActorPool`]: fragmentation, growth
//! recommendations, suggestions and a printable report. Safe to query from
//! worker threads; only [`compact_memory`](MemoryAdvisor::compact_memory) and
//! [`perform_smart_preallocation`](MemoryAdvisor::perform_smart_preallocation)
//! touch the pool.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::strategy::{AdvisorConfig, OptimizationStrategy};
use crate::pool::ActorPool;

/// Usage rate above which growth is suggested
pub const HIGH_USAGE: f32 = 0.9;
/// Usage rate below which shrinking is suggested
pub const LOW_USAGE: f32 = 0.3;
/// Pools at or below this size are never told to shrink
pub const SHRINK_MIN_POOL_SIZE: usize = 10;
/// Hit rate below which the preallocation strategy should change
pub const LOW_HIT_RATE: f32 = 0.7;
/// Estimated bytes above which the conservative strategy is suggested
pub const LARGE_POOL_BYTES: u64 = 100 * 1024 * 1024;

/// Memory view of one pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Estimated bytes held by the pool and its actors
    pub current_memory_usage: u64,
    /// Estimate divided by actors ever created
    pub average_actor_size: u64,
    /// Share of list entries that are tombstones
    pub fragmentation_ratio: f32,
}

/// Work performed by the advisor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationStats {
    pub total_optimizations: u64,
    pub total_preallocations: u64,
    pub total_memory_saved: u64,
}

/// Pool analyser parameterised by an [`OptimizationStrategy`]
#[derive(Debug)]
pub struct MemoryAdvisor {
    strategy: OptimizationStrategy,
    config: AdvisorConfig,
    optimizations: AtomicU64,
    preallocations: AtomicU64,
    memory_saved: AtomicU64,
}

impl MemoryAdvisor {
    #[must_use]
    pub fn new(strategy: OptimizationStrategy) -> Self {
        Self {
            strategy,
            config: AdvisorConfig::for_strategy(strategy),
            optimizations: AtomicU64::new(0),
            preallocations: AtomicU64::new(0),
            memory_saved: AtomicU64::new(0),
        }
    }

    #[must_use]
    #[inline]
    pub fn strategy(&self) -> OptimizationStrategy {
        self.strategy
    }

    #[must_use]
    #[inline]
    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Switch strategy, loading its preset thresholds
    pub fn set_strategy(&mut self, strategy: OptimizationStrategy) {
        if strategy == self.strategy {
            return;
        }
        log::info!("Optimisation strategy changed: {} -> {strategy}", self.strategy);
        self.strategy = strategy;
        if strategy != OptimizationStrategy::Custom {
            self.config = AdvisorConfig::for_strategy(strategy);
        }
    }

    /// Use explicit thresholds; the strategy becomes `Custom`
    pub fn set_config(&mut self, config: AdvisorConfig) {
        log::info!(
            "Advisor config updated: growth {:.2}, trigger {:.2}",
            config.growth_factor,
            config.trigger_threshold
        );
        self.config = config;
        self.strategy = OptimizationStrategy::Custom;
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Tombstone ratio of the pool's lists, 0 when empty
    #[must_use]
    pub fn fragmentation(&self, pool: &ActorPool) -> f32 {
        let (live, entries) = pool.tombstone_counts();
        if entries == 0 {
            return 0.0;
        }
        (1.0 - live as f32 / entries as f32).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn analyze_memory_usage(&self, pool: &ActorPool) -> MemoryStats {
        let current_memory_usage = pool.calculate_memory_usage();
        let created = pool.stats().total_created;
        let stats = MemoryStats {
            current_memory_usage,
            average_actor_size: current_memory_usage.checked_div(created).unwrap_or(0),
            fragmentation_ratio: self.fragmentation(pool),
        };
        log::trace!(
            "Memory analysis of {} pool: {} bytes, {:.1}% fragmented",
            pool.class().name(),
            stats.current_memory_usage,
            stats.fragmentation_ratio * 100.0
        );
        stats
    }

    /// Whether fragmentation exceeds the strategy's threshold
    #[must_use]
    pub fn should_optimize_memory(&self, pool: &ActorPool) -> bool {
        self.fragmentation(pool) > self.config.fragmentation_threshold
    }

    /// Whether the pool is busy enough to grow ahead of demand
    #[must_use]
    pub fn should_preallocate(&self, pool: &ActorPool) -> bool {
        self.config.enable_smart_preallocation
            && !pool.is_full()
            && pool.stats().usage_rate() >= self.config.trigger_threshold
    }

    /// Actors to add now, 0 when [`should_preallocate`](Self::should_preallocate) is false
    #[must_use]
    pub fn preallocation_count(&self, pool: &ActorPool) -> usize {
        if !self.should_preallocate(pool) {
            return 0;
        }
        let stats = pool.stats();
        let predicted = (stats.current_active as f32 * self.config.growth_factor).ceil() as usize;
        predicted
            .saturating_sub(stats.current_available)
            .clamp(self.config.min_prealloc_count, self.config.max_prealloc_count)
    }

    /// Prewarm the recommended count. Returns the number created.
    pub fn perform_smart_preallocation(&self, pool: &ActorPool) -> usize {
        let count = self.preallocation_count(pool);
        if count == 0 {
            return 0;
        }
        let created = pool.prewarm(count);
        self.preallocations.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Smart preallocation for {} pool: {created}/{count}",
            pool.class().name()
        );
        created
    }

    /// Sweep the pool's tombstones. Returns the estimated bytes saved.
    pub fn compact_memory(&self, pool: &ActorPool) -> u64 {
        let before = pool.calculate_memory_usage();
        pool.cleanup_invalid();
        let saved = before.saturating_sub(pool.calculate_memory_usage());

        self.optimizations.fetch_add(1, Ordering::Relaxed);
        self.memory_saved.fetch_add(saved, Ordering::Relaxed);
        log::info!("Compacted {} pool, saved {saved} bytes", pool.class().name());
        saved
    }

    /// One-line description of how the pool is being used
    #[must_use]
    pub fn usage_pattern(&self, pool: &ActorPool) -> String {
        let stats = pool.stats();
        if stats.total_created == 0 {
            return "Unused".to_string();
        }

        let efficiency = if stats.hit_rate > 0.9 {
            "Efficient"
        } else if stats.hit_rate > 0.7 {
            "Moderate"
        } else {
            "Inefficient"
        };
        let usage = stats.usage_rate();
        let load = if usage > 0.8 {
            "high load"
        } else if usage > 0.5 {
            "medium load"
        } else {
            "low load"
        };
        format!("{efficiency} reuse, {load}")
    }

    /// Human-readable recommendations, most urgent first
    #[must_use]
    pub fn suggestions(&self, pool: &ActorPool) -> Vec<String> {
        let memory = self.analyze_memory_usage(pool);
        let stats = pool.stats();
        let usage = stats.usage_rate();
        let mut suggestions = Vec::new();

        if memory.fragmentation_ratio > self.config.fragmentation_threshold {
            suggestions.push(format!(
                "Fragmentation is high ({:.1}%); compact the pool",
                memory.fragmentation_ratio * 100.0
            ));
        }
        if usage > HIGH_USAGE {
            suggestions.push("Usage is very high; grow the pool or enable smart preallocation".to_string());
        } else if usage < LOW_USAGE && stats.pool_size > SHRINK_MIN_POOL_SIZE {
            suggestions.push("Usage is low; shrink the pool to save memory".to_string());
        }
        if stats.hit_rate < LOW_HIT_RATE {
            suggestions.push(format!(
                "Hit rate is low ({:.1}%); adjust the preallocation strategy",
                stats.hit_rate * 100.0
            ));
        }
        if memory.current_memory_usage > LARGE_POOL_BYTES {
            suggestions.push("Memory use is large; switch to the conservative strategy".to_string());
        }
        suggestions
    }

    /// Formatted report with statistics, memory, usage and numbered suggestions
    #[must_use]
    pub fn report(&self, pool: &ActorPool) -> String {
        let stats = pool.stats();
        let memory = self.analyze_memory_usage(pool);

        let mut report = String::new();
        let _ = writeln!(report, "=== Actor Pool Report ===");
        let _ = writeln!(report, "Class: {}", stats.class_name);
        let _ = writeln!(report, "Strategy: {}", self.strategy);
        let _ = writeln!(report);
        let _ = writeln!(report, "=== Statistics ===");
        let _ = writeln!(report, "Created: {}", stats.total_created);
        let _ = writeln!(report, "Active: {}", stats.current_active);
        let _ = writeln!(report, "Available: {}", stats.current_available);
        let _ = writeln!(report, "Pool size: {}", stats.pool_size);
        let _ = writeln!(report, "Hit rate: {:.1}%", stats.hit_rate * 100.0);
        let _ = writeln!(report);
        let _ = writeln!(report, "=== Memory ===");
        let _ = writeln!(
            report,
            "Estimated usage: {:.2} MB",
            memory.current_memory_usage as f64 / (1024.0 * 1024.0)
        );
        let _ = writeln!(
            report,
            "Average actor size: {:.2} KB",
            memory.average_actor_size as f64 / 1024.0
        );
        let _ = writeln!(report, "Fragmentation: {:.1}%", memory.fragmentation_ratio * 100.0);
        let _ = writeln!(report);
        let _ = writeln!(report, "=== Usage ===");
        let _ = writeln!(report, "{}", self.usage_pattern(pool));
        let _ = writeln!(report);
        let _ = writeln!(report, "=== Suggestions ===");

        let suggestions = self.suggestions(pool);
        if suggestions.is_empty() {
            let _ = writeln!(report, "Pool is healthy, no optimisation needed.");
        }
        for (i, suggestion) in suggestions.iter().enumerate() {
            let _ = writeln!(report, "{}. {suggestion}", i + 1);
        }
        report
    }

    /// Work performed so far
    #[must_use]
    pub fn optimization_stats(&self) -> OptimizationStats {
        OptimizationStats {
            total_optimizations: self.optimizations.load(Ordering::Relaxed),
            total_preallocations: self.preallocations.load(Ordering::Relaxed),
            total_memory_saved: self.memory_saved.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryAdvisor {
    fn default() -> Self {
        Self::new(OptimizationStrategy::default())
    }
}
