//! Preallocation strategies and configuration

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Default memory budget: 100 MiB
pub const DEFAULT_MEMORY_BUDGET: u64 = 100 * 1024 * 1024;

/// How a preallocator fills its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PreallocStrategy {
    /// Never starts
    Disabled,
    /// Construct the whole target synchronously on start
    Immediate,
    /// No background work; acquire constructs on demand
    Lazy,
    /// Construct up to `max_per_frame` each tick until the target is reached
    #[default]
    Progressive,
    /// Construct toward a need predicted from recent usage
    Predictive,
    /// Progressive with a per-frame rate scaled by usage
    Adaptive,
}

impl std::fmt::Display for PreallocStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Preallocator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreallocConfig {
    pub strategy: PreallocStrategy,
    /// Objects to construct over the run
    pub target_count: usize,
    /// Constructions allowed per tick (treated as at least 1)
    pub max_per_frame: usize,
    /// Accumulated tick time before work begins
    pub delay_seconds: f32,
    pub enable_memory_budget: bool,
    pub memory_budget_bytes: u64,
    /// Raise the target when usage crosses `expand_threshold`
    pub dynamic_adjust: bool,
    pub expand_threshold: f32,
    pub shrink_threshold: f32,
    pub expand_multiplier: f32,
    pub shrink_multiplier: f32,
}

impl Default for PreallocConfig {
    fn default() -> Self {
        Self {
            strategy: PreallocStrategy::Progressive,
            target_count: 0,
            max_per_frame: 10,
            delay_seconds: 0.0,
            enable_memory_budget: false,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
            dynamic_adjust: false,
            expand_threshold: 0.8,
            shrink_threshold: 0.3,
            expand_multiplier: 1.5,
            shrink_multiplier: 0.8,
        }
    }
}

impl PreallocConfig {
    /// Config for `strategy` with `target_count` objects
    #[must_use]
    pub fn new(strategy: PreallocStrategy, target_count: usize) -> Self {
        Self {
            strategy,
            target_count,
            ..Default::default()
        }
    }

    /// Set the per-tick construction cap
    #[must_use]
    pub fn with_max_per_frame(mut self, max_per_frame: usize) -> Self {
        self.max_per_frame = max_per_frame;
        self
    }

    /// Wait this long (in tick time) before constructing
    #[must_use]
    pub fn with_delay(mut self, seconds: f32) -> Self {
        self.delay_seconds = seconds;
        self
    }

    /// Enforce a memory budget on the pool estimate
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.enable_memory_budget = true;
        self.memory_budget_bytes = bytes;
        self
    }

    /// Enable usage-driven target adjustment
    #[must_use]
    pub fn with_dynamic_adjust(mut self, enabled: bool) -> Self {
        self.dynamic_adjust = enabled;
        self
    }

    /// Constructions allowed in one tick
    #[must_use]
    #[inline]
    pub fn per_frame(&self) -> usize {
        self.max_per_frame.max(1)
    }

    /// Whether `bytes` fits the budget (always true with the budget off)
    #[must_use]
    pub fn within_budget(&self, bytes: u64) -> bool {
        !self.enable_memory_budget || bytes <= self.memory_budget_bytes
    }

    /// Check thresholds and multipliers are usable
    pub fn validate(&self) -> PoolResult<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.expand_threshold) || !unit.contains(&self.shrink_threshold) {
            return Err(PoolError::Config("thresholds must lie in [0, 1]".into()));
        }
        if self.shrink_threshold >= self.expand_threshold {
            return Err(PoolError::Config(
                "shrink threshold must be below expand threshold".into(),
            ));
        }
        if self.expand_multiplier <= 1.0 || !(0.0..1.0).contains(&self.shrink_multiplier) {
            return Err(PoolError::Config(
                "expand multiplier must exceed 1 and shrink multiplier lie in [0, 1)".into(),
            ));
        }
        if self.delay_seconds < 0.0 {
            return Err(PoolError::Config("delay must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PreallocConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.per_frame(), 10);
        assert!(config.within_budget(u64::MAX), "Budget off by default");
    }

    #[test]
    fn test_zero_per_frame_still_allocates() {
        let config = PreallocConfig::new(PreallocStrategy::Progressive, 5).with_max_per_frame(0);
        assert_eq!(config.per_frame(), 1);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = PreallocConfig {
            expand_threshold: 0.2,
            shrink_threshold: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: PreallocConfig =
            ron::from_str("(strategy: Adaptive, target_count: 12)").expect("parse");
        assert_eq!(config.strategy, PreallocStrategy::Adaptive);
        assert_eq!(config.target_count, 12);
        assert_eq!(config.max_per_frame, 10);
    }
}
