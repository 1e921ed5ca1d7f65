//! Pool statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Class the pool manages
    pub class_name: String,
    /// Objects ever constructed by the pool
    pub total_created: u64,
    /// Objects currently handed out
    pub current_active: usize,
    /// Objects parked and ready for reuse
    pub current_available: usize,
    /// `current_active + current_available`
    pub pool_size: usize,
    /// `pool_hits / total_requests`, 0 with no requests
    pub hit_rate: f32,
    /// Acquire requests served
    pub total_requests: u64,
    /// Requests served by reusing a parked object
    pub pool_hits: u64,
}

impl PoolStats {
    /// Fraction of the pool currently in use
    #[must_use]
    pub fn usage_rate(&self) -> f32 {
        if self.pool_size == 0 {
            return 0.0;
        }
        self.current_active as f32 / self.pool_size as f32
    }

    /// Get a formatted stats string
    #[must_use]
    pub fn format_stats(&self) -> String {
        format!(
            "{}: {} active / {} available (size {}) | hit rate {:.1}% ({}/{}) | created {}",
            self.class_name,
            self.current_active,
            self.current_available,
            self.pool_size,
            self.hit_rate * 100.0,
            self.pool_hits,
            self.total_requests,
            self.total_created
        )
    }
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_stats())
    }
}

/// Timing of reset-for-pooling operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetStats {
    pub total_resets: u64,
    pub failed_resets: u64,
    pub total_time: Duration,
    pub max_time: Duration,
}

impl ResetStats {
    /// Record one reset attempt
    pub fn record(&mut self, elapsed: Duration, succeeded: bool) {
        self.total_resets += 1;
        if !succeeded {
            self.failed_resets += 1;
        }
        self.total_time += elapsed;
        self.max_time = self.max_time.max(elapsed);
    }

    /// Mean time per reset
    #[must_use]
    pub fn average_time(&self) -> Duration {
        match self.total_resets {
            0 => Duration::ZERO,
            n => self.total_time / n as u32,
        }
    }

    /// Fraction of resets that succeeded
    #[must_use]
    pub fn success_rate(&self) -> f32 {
        if self.total_resets == 0 {
            return 1.0;
        }
        (self.total_resets - self.failed_resets) as f32 / self.total_resets as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_rate_handles_empty_pool() {
        let stats = PoolStats::default();
        assert_eq!(stats.usage_rate(), 0.0);

        let stats = PoolStats {
            current_active: 3,
            current_available: 1,
            pool_size: 4,
            ..Default::default()
        };
        assert!((stats.usage_rate() - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reset_stats_record() {
        let mut stats = ResetStats::default();
        stats.record(Duration::from_millis(2), true);
        stats.record(Duration::from_millis(4), false);

        assert_eq!(stats.total_resets, 2);
        assert_eq!(stats.average_time(), Duration::from_millis(3));
        assert_eq!(stats.max_time, Duration::from_millis(4));
        assert!((stats.success_rate() - 0.5).abs() < f32::EPSILON);
    }
}
