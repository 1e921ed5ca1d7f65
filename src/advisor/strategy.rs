//! Optimisation strategies and their thresholds

use serde::{Deserialize, Serialize};

/// How eagerly the advisor grows and compacts pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OptimizationStrategy {
    /// Grow slowly, compact only when badly fragmented
    Conservative,
    #[default]
    Balanced,
    /// Grow early and in large steps
    Aggressive,
    /// User-supplied thresholds
    Custom,
}

impl std::fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Conservative => "Conservative",
            Self::Balanced => "Balanced",
            Self::Aggressive => "Aggressive",
            Self::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Thresholds used by [`MemoryAdvisor`](super::MemoryAdvisor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Multiplier on the active count when sizing growth
    pub growth_factor: f32,
    pub min_prealloc_count: usize,
    pub max_prealloc_count: usize,
    /// Usage rate at which growth is recommended
    pub trigger_threshold: f32,
    pub enable_smart_preallocation: bool,
    /// Tombstone ratio above which compaction is recommended
    pub fragmentation_threshold: f32,
}

impl AdvisorConfig {
    /// Preset thresholds for `strategy`; `Custom` yields the balanced preset
    #[must_use]
    pub fn for_strategy(strategy: OptimizationStrategy) -> Self {
        match strategy {
            OptimizationStrategy::Conservative => Self {
                growth_factor: 1.2,
                min_prealloc_count: 2,
                max_prealloc_count: 10,
                trigger_threshold: 0.9,
                enable_smart_preallocation: false,
                fragmentation_threshold: 0.5,
            },
            OptimizationStrategy::Balanced | OptimizationStrategy::Custom => Self {
                growth_factor: 1.5,
                min_prealloc_count: 5,
                max_prealloc_count: 25,
                trigger_threshold: 0.8,
                enable_smart_preallocation: true,
                fragmentation_threshold: 0.3,
            },
            OptimizationStrategy::Aggressive => Self {
                growth_factor: 2.0,
                min_prealloc_count: 10,
                max_prealloc_count: 50,
                trigger_threshold: 0.7,
                enable_smart_preallocation: true,
                fragmentation_threshold: 0.2,
            },
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self::for_strategy(OptimizationStrategy::Balanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_ordered() {
        let conservative = AdvisorConfig::for_strategy(OptimizationStrategy::Conservative);
        let balanced = AdvisorConfig::for_strategy(OptimizationStrategy::Balanced);
        let aggressive = AdvisorConfig::for_strategy(OptimizationStrategy::Aggressive);

        assert!(conservative.growth_factor < balanced.growth_factor);
        assert!(balanced.growth_factor < aggressive.growth_factor);
        assert!(conservative.trigger_threshold > aggressive.trigger_threshold);
        assert!(conservative.fragmentation_threshold > aggressive.fragmentation_threshold);
        assert!(!conservative.enable_smart_preallocation);
        assert_eq!(balanced, AdvisorConfig::default());
    }

    #[test]
    fn test_partial_ron_uses_balanced_defaults() {
        let config: AdvisorConfig = ron::from_str("(growth_factor: 3.0)").unwrap();
        assert_eq!(config.growth_factor, 3.0);
        assert_eq!(config.max_prealloc_count, 25);
    }
}
