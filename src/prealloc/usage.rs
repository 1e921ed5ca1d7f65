//! Rolling history of active-object counts

use std::collections::VecDeque;

/// Bounded history of observed active counts, oldest first
#[derive(Debug, Clone)]
pub struct UsageHistory {
    /// Samples, newest at the back
    samples: VecDeque<usize>,
    /// Maximum samples to keep
    max_samples: usize,
}

impl UsageHistory {
    /// Default number of retained samples
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Create a history with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a history that keeps at most `max_samples`
    pub fn with_capacity(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record one observation, evicting the oldest when full
    pub fn record(&mut self, active_count: usize) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(active_count);
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the newest `window` samples
    pub fn recent_mean(&self, window: usize) -> Option<f32> {
        let take = window.min(self.samples.len());
        if take == 0 {
            return None;
        }
        let sum: usize = self.samples.iter().rev().take(take).sum();
        Some(sum as f32 / take as f32)
    }

    /// Highest retained sample
    pub fn peak(&self) -> usize {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Forget all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = UsageHistory::with_capacity(3);
        for n in [1, 2, 3, 4] {
            history.record(n);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.peak(), 4);
        assert_eq!(history.recent_mean(10), Some(3.0));
    }

    #[test]
    fn test_recent_mean_uses_newest_window() {
        let mut history = UsageHistory::new();
        for n in [100, 100, 2, 4] {
            history.record(n);
        }
        assert_eq!(history.recent_mean(2), Some(3.0));
        assert_eq!(UsageHistory::new().recent_mean(5), None);
    }
}
