//! Health checks computed from a [`PoolStats`] snapshot alone

use crate::pool::PoolStats;

/// Hit rate below which a busy pool is unhealthy
pub const MIN_HEALTHY_HIT_RATE: f32 = 0.3;
/// Share of created actors sitting unused above which a pool is unhealthy
pub const MAX_UNUSED_RATIO: f32 = 0.8;

fn low_hit_rate(stats: &PoolStats) -> bool {
    stats.hit_rate < MIN_HEALTHY_HIT_RATE && stats.total_created > 10
}

fn mostly_unused(stats: &PoolStats) -> bool {
    stats.current_available as f32 > stats.total_created as f32 * MAX_UNUSED_RATIO
        && stats.total_created > 20
}

/// Whether the pool is earning its keep
#[must_use]
pub fn is_pool_healthy(stats: &PoolStats) -> bool {
    !low_hit_rate(stats) && !mostly_unused(stats)
}

/// "Healthy", or the problems found
#[must_use]
pub fn health_description(stats: &PoolStats) -> String {
    let mut issues = Vec::new();
    if low_hit_rate(stats) {
        issues.push(format!("low hit rate ({:.1}%)", stats.hit_rate * 100.0));
    }
    if mostly_unused(stats) {
        issues.push("too many unused actors".to_string());
    }
    if issues.is_empty() {
        "Healthy".to_string()
    } else {
        issues.join(", ")
    }
}

/// Tuning hints for the pool's configuration
#[must_use]
pub fn performance_suggestions(stats: &PoolStats) -> Vec<String> {
    let mut suggestions = Vec::new();
    if stats.hit_rate < 0.5 && stats.total_created > 10 {
        suggestions.push("Increase the initial pool size to raise the hit rate".to_string());
    }
    if stats.current_available as f32 > stats.total_created as f32 * 0.7 && stats.total_created > 20 {
        suggestions.push("Lower the hard limit to release unused actors".to_string());
    }
    if stats.pool_size > 100 {
        suggestions.push("Pool is large; review its usage pattern".to_string());
    }
    if stats.total_created > 0
        && stats.total_created == stats.current_active as u64
        && stats.current_available == 0
    {
        suggestions.push("Pool may be too small; consider raising its hard limit".to_string());
    }
    suggestions
}
