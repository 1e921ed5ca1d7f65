//! Strategy-driven background filler for one pool
//!
//! A [`Preallocator`] grows its pool's free list off the acquire hot path,
//! either all at once ([`Immediate`](PreallocStrategy::Immediate)) or a few
//! objects per [`tick`](Preallocator::tick). Every construction goes through
//! [`ActorPool::prewarm`], so it serialises with user code on the pool's lock
//! and never fires lifecycle events.
//!
//! # Design Principles
//!
//! - **Budgeted**: with a memory budget enabled, the pool's projected estimate
//!   is re-read before every single construction
//! - **Stoppable**: the active flag is checked between constructions
//! - **Weakly Attached**: holds a `Weak` to its pool and stops once it is gone

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::config::{PreallocConfig, PreallocStrategy};
use super::usage::UsageHistory;
use crate::pool::{ActorPool, PoolStats, reset};

/// Samples needed before prediction replaces the configured target
pub const MIN_PREDICTION_SAMPLES: usize = 3;
/// Newest samples averaged by prediction
pub const PREDICTION_WINDOW: usize = 10;
/// Headroom applied to the predicted need
pub const PREDICTION_HEADROOM: f32 = 1.2;
/// Adaptive per-frame ceiling when usage is high
pub const ADAPTIVE_MAX_PER_FRAME: usize = 10;

/// Progress and timing of a preallocation run
#[derive(Debug, Clone, Default)]
pub struct PreallocStats {
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    /// Objects constructed
    pub created: usize,
    /// Constructions the pool refused
    pub failed: usize,
    /// Ticks (or start calls) that attempted construction
    pub operations: usize,
    /// Target at the latest tick
    pub target: usize,
    pub success_rate: f32,
    /// Pool memory estimate at the latest update
    pub memory_used: u64,
    pub total_time: Duration,
    pub average_time: Duration,
}

impl PreallocStats {
    /// Progress toward the target in percent
    #[must_use]
    pub fn completion_percentage(&self) -> f32 {
        if self.target == 0 {
            return 100.0;
        }
        (self.created as f32 / self.target as f32 * 100.0).clamp(0.0, 100.0)
    }

    /// Run duration so far, or total once finished
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        Some(
            self.finished_at
                .map_or_else(|| start.elapsed(), |end| end.duration_since(start)),
        )
    }
}

/// Recommendation from [`Preallocator::check_adjustment_needed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Adjustment {
    pub should_adjust: bool,
    pub should_expand: bool,
    pub recommended_size: usize,
}

#[derive(Debug)]
struct PreallocState {
    config: PreallocConfig,
    stats: PreallocStats,
    /// Objects constructed toward the target this run
    progress: usize,
    accumulated: f32,
    usage: UsageHistory,
    budget_exhausted: bool,
    pool_full: bool,
}

impl PreallocState {
    fn new(config: PreallocConfig) -> Self {
        Self {
            config,
            stats: PreallocStats::default(),
            progress: 0,
            accumulated: 0.0,
            usage: UsageHistory::new(),
            budget_exhausted: false,
            pool_full: false,
        }
    }

    fn predict(&self) -> usize {
        let target = self.config.target_count;
        if self.usage.len() < MIN_PREDICTION_SAMPLES {
            return target;
        }
        let mean = self.usage.recent_mean(PREDICTION_WINDOW).unwrap_or(0.0);
        let predicted = (mean * PREDICTION_HEADROOM).ceil() as usize;
        predicted.clamp(1, (2 * target).max(1))
    }

    fn refresh_stats(&mut self, pool: &ActorPool) {
        let stats = &mut self.stats;
        let attempts = stats.created + stats.failed;
        stats.success_rate = if attempts == 0 {
            1.0
        } else {
            stats.created as f32 / attempts as f32
        };
        stats.average_time = match stats.created {
            0 => Duration::ZERO,
            n => stats.total_time / n as u32,
        };
        stats.target = self.config.target_count;
        stats.memory_used = pool.calculate_memory_usage();
    }

    fn is_done(&self) -> bool {
        self.progress >= self.config.target_count || self.budget_exhausted || self.pool_full
    }
}

/// Background filler attached to one [`ActorPool`]
pub struct Preallocator {
    pool: Weak<ActorPool>,
    active: AtomicBool,
    state: Mutex<PreallocState>,
}

impl Preallocator {
    /// Create an idle preallocator for `pool`
    #[must_use]
    pub fn new(pool: &Arc<ActorPool>) -> Self {
        Self {
            pool: Arc::downgrade(pool),
            active: AtomicBool::new(false),
            state: Mutex::new(PreallocState::new(PreallocConfig::default())),
        }
    }

    /// Begin a run with `config`. Returns whether it was accepted.
    ///
    /// Immediate runs complete before this returns. Lazy runs are accepted
    /// but do no work.
    pub fn start(&self, config: PreallocConfig) -> bool {
        let Some(pool) = self.pool.upgrade() else {
            log::warn!("Preallocator start refused: pool is gone");
            return false;
        };
        if !pool.is_initialized() {
            log::warn!("Preallocator start refused: {} pool is not initialised", pool.class().name());
            return false;
        }
        if self.is_active() {
            log::warn!("Preallocator for {} pool is already running", pool.class().name());
            return false;
        }
        if config.strategy == PreallocStrategy::Disabled {
            log::info!("Preallocation disabled for {} pool", pool.class().name());
            return false;
        }
        if let Err(e) = config.validate() {
            log::warn!("Preallocator for {} pool: {e}", pool.class().name());
            return false;
        }

        let strategy = config.strategy;
        let target = config.target_count;
        if !config.within_budget(pool.projected_memory_usage(target)) {
            log::info!(
                "Preallocation target {target} for {} pool exceeds its memory budget and will be capped",
                pool.class().name()
            );
        }

        let mut state = self.state.lock();
        *state = PreallocState::new(config);
        state.stats.started_at = Some(Instant::now());
        state.stats.target = target;

        match strategy {
            PreallocStrategy::Lazy => {
                state.stats.finished_at = state.stats.started_at;
                log::info!("Lazy preallocation for {} pool: nothing to do", pool.class().name());
            }
            PreallocStrategy::Immediate => {
                self.active.store(true, Ordering::Release);
                self.fill(&pool, &mut state, target);
                self.active.store(false, Ordering::Release);
                state.refresh_stats(&pool);
                state.stats.finished_at = Some(Instant::now());
                log::info!(
                    "Immediate preallocation for {} pool created {}/{target}",
                    pool.class().name(),
                    state.stats.created
                );
            }
            _ => {
                self.active.store(true, Ordering::Release);
                log::info!(
                    "Started {strategy} preallocation for {} pool, target {target}",
                    pool.class().name()
                );
            }
        }
        true
    }

    /// End the current run; safe to call when idle
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        state.stats.finished_at = Some(Instant::now());
        log::info!(
            "Preallocation finished: {} created, {} failed ({:.0}% of target)",
            state.stats.created,
            state.stats.failed,
            state.stats.completion_percentage()
        );
    }

    /// Advance by `delta_seconds` of simulation time
    pub fn tick(&self, delta_seconds: f32) {
        if !self.is_active() {
            return;
        }
        let Some(pool) = self.pool.upgrade() else {
            self.stop();
            return;
        };

        let mut state = self.state.lock();
        state.accumulated += delta_seconds;
        if state.accumulated < state.config.delay_seconds {
            return;
        }

        let pool_stats = pool.stats();
        state.usage.record(pool_stats.current_active);

        if state.config.dynamic_adjust {
            let adjustment = Self::adjustment(&state.config, &pool_stats);
            if adjustment.should_expand && adjustment.recommended_size > state.config.target_count {
                let hard_limit = pool.hard_limit();
                let raised = if hard_limit == 0 {
                    adjustment.recommended_size
                } else {
                    adjustment.recommended_size.min(hard_limit)
                };
                log::debug!(
                    "Raising preallocation target of {} pool to {raised}",
                    pool.class().name()
                );
                state.config.target_count = state.config.target_count.max(raised);
            }
        }

        let per_frame = state.config.per_frame();
        let remaining = state.config.target_count.saturating_sub(state.progress);
        let wanted = match state.config.strategy {
            PreallocStrategy::Progressive => per_frame,
            PreallocStrategy::Predictive => state
                .predict()
                .saturating_sub(pool_stats.pool_size)
                .min(per_frame),
            PreallocStrategy::Adaptive => {
                let usage = pool_stats.usage_rate();
                if usage > 0.8 {
                    (per_frame * 2).min(ADAPTIVE_MAX_PER_FRAME)
                } else if usage < 0.3 {
                    (per_frame / 2).max(1)
                } else {
                    per_frame
                }
            }
            PreallocStrategy::Disabled | PreallocStrategy::Immediate | PreallocStrategy::Lazy => 0,
        }
        .min(remaining);

        self.fill(&pool, &mut state, wanted);
        state.refresh_stats(&pool);

        if state.is_done() {
            drop(state);
            self.stop();
        }
    }

    /// Construct up to `count` objects, honouring the budget and stop flag
    fn fill(&self, pool: &ActorPool, state: &mut PreallocState, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        state.stats.operations += 1;

        let mut made = 0;
        for _ in 0..count {
            if !self.is_active() {
                break;
            }
            if !state.config.within_budget(pool.projected_memory_usage(1)) {
                log::debug!("{} pool reached its preallocation memory budget", pool.class().name());
                state.budget_exhausted = true;
                break;
            }
            if pool.is_full() {
                state.pool_full = true;
                break;
            }

            let started = Instant::now();
            if pool.prewarm(1) == 1 {
                made += 1;
                state.progress += 1;
                state.stats.created += 1;
                state.stats.total_time += started.elapsed();
            } else {
                state.stats.failed += 1;
                break;
            }
        }
        made
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether a run is in progress
    #[must_use]
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Statistics of the current or last run
    #[must_use]
    pub fn stats(&self) -> PreallocStats {
        self.state.lock().stats.clone()
    }

    /// Config of the current or last run (including adjusted target)
    #[must_use]
    pub fn config(&self) -> PreallocConfig {
        self.state.lock().config.clone()
    }

    /// Record an observed active count for prediction
    pub fn record_usage(&self, active_count: usize) {
        self.state.lock().usage.record(active_count);
    }

    /// Predicted active count: the target until enough samples exist, then
    /// the recent mean with headroom, bounded to `[1, 2 * target]`
    #[must_use]
    pub fn predict_required_count(&self) -> usize {
        self.state.lock().predict()
    }

    /// Whether `bytes` fits the configured budget
    #[must_use]
    pub fn check_memory_budget(&self, bytes: u64) -> bool {
        self.state.lock().config.within_budget(bytes)
    }

    /// Estimated bytes per object of the pool's class
    #[must_use]
    pub fn estimate_object_size(&self) -> u64 {
        self.pool
            .upgrade()
            .map_or(0, |pool| reset::object_footprint(pool.class()))
    }

    /// Recommend growing or shrinking the pool from its usage rate
    #[must_use]
    pub fn check_adjustment_needed(&self, stats: &PoolStats) -> Adjustment {
        Self::adjustment(&self.state.lock().config, stats)
    }

    fn adjustment(config: &PreallocConfig, stats: &PoolStats) -> Adjustment {
        if !config.dynamic_adjust || stats.pool_size == 0 {
            return Adjustment::default();
        }

        let usage = stats.usage_rate();
        let size = stats.pool_size as f32;
        if usage >= config.expand_threshold {
            Adjustment {
                should_adjust: true,
                should_expand: true,
                recommended_size: ((size * config.expand_multiplier).ceil() as usize)
                    .max(stats.pool_size + 1),
            }
        } else if usage <= config.shrink_threshold && stats.pool_size > 1 {
            Adjustment {
                should_adjust: true,
                should_expand: false,
                recommended_size: ((size * config.shrink_multiplier).floor() as usize).max(1),
            }
        } else {
            Adjustment::default()
        }
    }
}

impl std::fmt::Debug for Preallocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preallocator")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
