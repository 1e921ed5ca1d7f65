//! Per-class actor pool
//!
//! Keeps fully constructed actors of one class parked in a free list and hands
//! them back out instead of spawning new ones.
//!
//! # Design Principles
//!
//! - **Split-Phase Locking**: the list lock is never held while user code runs;
//!   activation and reset happen between two short critical sections
//! - **Never Fail**: when the free list is empty the pool constructs, even past
//!   its hard limit (with a single warning per crossing)
//! - **Weak Entries**: both lists hold generational handles; entries whose
//!   actor was reclaimed (tombstones) are skipped and swept lazily
//! - **LIFO Reuse**: the most recently returned actor is handed out first
//!
//! # Performance Characteristics
//!
//! | Operation        | Complexity            |
//! |------------------|-----------------------|
//! | Acquire (warm)   | O(1) amortised        |
//! | Acquire (cold)   | O(1) + spawn          |
//! | Return           | O(active)             |
//! | Tombstone sweep  | O(active + available) |
//!
//! # Example
//!
//! ```ignore
//! let pool = ActorPool::with_gc(world.clone(), PoolConfig::new(bullet), &gc);
//! pool.initialize_pool();
//!
//! let shot = pool.acquire(&Transform::from_position(muzzle)).unwrap();
//! // ... later
//! pool.release(shot);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;

use super::config::PoolConfig;
use super::guard::{self, DispatchScope};
use super::reset;
use super::stats::{PoolStats, ResetStats};
use crate::error::{PoolError, PoolResult};
use crate::prealloc::{PreallocConfig, PreallocStats, Preallocator};
use crate::scene::{ActorClass, ActorHandle, GarbageCollector, GcHookId, Transform, World};

/// Acquire requests between opportunistic tombstone sweeps
pub const CLEANUP_FREQUENCY: u64 = 50;

/// Global counter for generating unique pool IDs
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct PoolLists {
    /// Parked actors, most recently returned last
    available: Vec<ActorHandle>,
    /// Actors handed out to callers
    active: Vec<ActorHandle>,
    /// Mid-transition inside a pool operation with the lock released
    in_flight: FxHashSet<ActorHandle>,
    /// Handed out by `acquire_deferred`, awaiting `finalize_deferred`
    deferred: FxHashSet<ActorHandle>,
    /// Maximum retained actors; 0 means unlimited
    hard_limit: usize,
}

impl PoolLists {
    fn managed(&self) -> usize {
        self.available.len() + self.active.len() + self.in_flight.len() + self.deferred.len()
    }

    fn at_limit(&self) -> bool {
        self.hard_limit > 0 && self.managed() >= self.hard_limit
    }

    fn is_tracked(&self, actor: ActorHandle) -> bool {
        self.available.contains(&actor)
            || self.active.contains(&actor)
            || self.in_flight.contains(&actor)
            || self.deferred.contains(&actor)
    }

    /// Drop every entry whose actor is gone. Returns the number removed.
    fn sweep(&mut self, world: &World) -> usize {
        let before = self.available.len() + self.active.len() + self.deferred.len();
        self.available.retain(|&actor| world.is_valid(actor));
        self.active.retain(|&actor| world.is_valid(actor));
        self.deferred.retain(|&actor| world.is_valid(actor));
        before - (self.available.len() + self.active.len() + self.deferred.len())
    }
}

/// Pool of reusable actors of a single class.
pub struct ActorPool {
    id: u64,
    class: ActorClass,
    initial_size: usize,
    enable_prewarm: bool,
    initialized: bool,
    world: Arc<World>,
    lists: RwLock<PoolLists>,
    total_requests: AtomicU64,
    pool_hits: AtomicU64,
    total_created: AtomicU64,
    /// Set once the hard limit is crossed; cleared when back under it
    overflow_warned: AtomicBool,
    reset_stats: Mutex<ResetStats>,
    preallocator: Mutex<Option<Preallocator>>,
    gc_hook: Option<(Arc<GarbageCollector>, GcHookId)>,
}

impl ActorPool {
    /// Create a pool bound to `world`.
    ///
    /// An invalid config still yields a pool, but one that refuses every
    /// operation with [`PoolError::NotInitialised`].
    #[must_use]
    pub fn new(world: Arc<World>, config: PoolConfig) -> Arc<Self> {
        Self::build(world, config, None)
    }

    /// Create a pool that sweeps its tombstones before every collection of `gc`
    #[must_use]
    pub fn with_gc(world: Arc<World>, config: PoolConfig, gc: &Arc<GarbageCollector>) -> Arc<Self> {
        Self::build(world, config, Some(gc))
    }

    fn build(
        world: Arc<World>,
        config: PoolConfig,
        gc: Option<&Arc<GarbageCollector>>,
    ) -> Arc<Self> {
        let initialized = match config.validate() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Pool for {} not initialised: {e}", config.class.name());
                false
            }
        };

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let gc_hook = gc.filter(|_| initialized).map(|gc| {
                let weak = weak.clone();
                let id = gc.subscribe_pre_collect(move || {
                    if let Some(pool) = weak.upgrade() {
                        pool.cleanup_invalid();
                    }
                });
                (Arc::clone(gc), id)
            });

            if initialized {
                log::info!(
                    "Created pool for {} (initial {}, hard limit {})",
                    config.class.name(),
                    config.initial_size,
                    config.hard_limit
                );
            }

            Self {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                class: config.class,
                initial_size: config.initial_size,
                enable_prewarm: config.enable_prewarm,
                initialized,
                world,
                lists: RwLock::new(PoolLists {
                    hard_limit: config.hard_limit,
                    ..Default::default()
                }),
                total_requests: AtomicU64::new(0),
                pool_hits: AtomicU64::new(0),
                total_created: AtomicU64::new(0),
                overflow_warned: AtomicBool::new(false),
                reset_stats: Mutex::new(ResetStats::default()),
                preallocator: Mutex::new(None),
                gc_hook,
            }
        })
    }

    /// Prewarm `initial_size` actors if the config enables it.
    /// Returns the number created.
    pub fn initialize_pool(&self) -> usize {
        if !self.enable_prewarm {
            return 0;
        }
        self.prewarm(self.initial_size)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Unique pool id
    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Class this pool manages
    #[must_use]
    #[inline]
    pub fn class(&self) -> &ActorClass {
        &self.class
    }

    /// World the pool spawns into
    #[must_use]
    #[inline]
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Whether the config was valid at construction
    #[must_use]
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Configured prewarm size
    #[must_use]
    #[inline]
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Current hard limit (0 for unlimited)
    #[must_use]
    pub fn hard_limit(&self) -> usize {
        self.lists.read().hard_limit
    }

    // ========================================================================
    // Acquire / Return
    // ========================================================================

    /// Hand out an activated actor at `transform`.
    ///
    /// Reuses the most recently returned actor when one is parked, otherwise
    /// constructs a new one (past the hard limit if necessary). Returns
    /// `None` only when the world refuses to construct.
    pub fn acquire(&self, transform: &Transform) -> Option<ActorHandle> {
        if !self.check_usable("acquire") {
            return None;
        }
        let request = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(actor) = self.take_available(request) {
            let result = match self.activate(actor, transform) {
                Err(PoolError::ActivationFailed(e)) if self.can_basic_reset(actor) => {
                    log::warn!(
                        "Full activation of {actor} unavailable ({e}), using basic reset"
                    );
                    reset::basic_reset(&self.world, actor, transform, true)
                }
                other => other,
            };
            match result {
                Ok(()) => {
                    self.land_active(actor);
                    self.pool_hits.fetch_add(1, Ordering::Release);
                    log::trace!("Reused {actor} from {} pool", self.class.name());
                    return Some(actor);
                }
                Err(e) => {
                    log::warn!("Discarding reused {actor} from {} pool: {e}", self.class.name());
                    self.discard(actor);
                }
            }
        }

        let actor = match self.construct_in_flight() {
            Ok(actor) => actor,
            Err(e) => {
                log::warn!("{} pool could not construct: {e}", self.class.name());
                return None;
            }
        };
        match self.activate(actor, transform) {
            Ok(()) => {
                self.land_active(actor);
                Some(actor)
            }
            Err(e) => {
                log::warn!("{} pool could not activate new {actor}: {e}", self.class.name());
                self.discard(actor);
                None
            }
        }
    }

    /// Hand out an actor without activating it.
    ///
    /// The caller sets spawn parameters and then calls
    /// [`finalize_deferred`](Self::finalize_deferred). No events fire until then.
    pub fn acquire_deferred(&self) -> Option<ActorHandle> {
        if !self.check_usable("acquire_deferred") {
            return None;
        }
        let request = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;

        let actor = match self.take_available(request) {
            Some(actor) => {
                self.pool_hits.fetch_add(1, Ordering::Release);
                actor
            }
            None => match self.construct_in_flight() {
                Ok(actor) => actor,
                Err(e) => {
                    log::warn!("{} pool could not construct: {e}", self.class.name());
                    return None;
                }
            },
        };

        let mut lists = self.lists.write();
        lists.in_flight.remove(&actor);
        lists.deferred.insert(actor);
        Some(actor)
    }

    /// Activate an actor obtained from [`acquire_deferred`](Self::acquire_deferred).
    ///
    /// Untracked actors of this class are adopted.
    pub fn finalize_deferred(&self, actor: ActorHandle, transform: &Transform) -> bool {
        if !self.check_usable("finalize_deferred") {
            return false;
        }
        if let Err(e) = self.check_object(actor) {
            log::warn!("Finalize in {} pool rejected: {e}", self.class.name());
            return false;
        }

        {
            let mut lists = self.lists.write();
            if !lists.deferred.remove(&actor) {
                if lists.is_tracked(actor) {
                    log::warn!("{actor} is not awaiting finalisation in {} pool", self.class.name());
                    return false;
                }
                log::debug!("Adopting untracked {actor} into {} pool", self.class.name());
            }
            lists.in_flight.insert(actor);
        }

        match self.activate(actor, transform) {
            Ok(()) => {
                self.land_active(actor);
                true
            }
            Err(e) => {
                log::warn!("Finalize of {actor} in {} pool failed: {e}", self.class.name());
                self.discard(actor);
                false
            }
        }
    }

    /// Return an actor to the pool.
    ///
    /// Returns false for invalid or wrong-class actors and for actors that are
    /// already parked. Untracked actors of this class are adopted.
    pub fn release(&self, actor: ActorHandle) -> bool {
        if !self.check_usable("release") {
            return false;
        }
        if let Err(e) = self.check_object(actor) {
            log::warn!("Return to {} pool rejected: {e}", self.class.name());
            return false;
        }

        let unfinalised = {
            let mut lists = self.lists.write();
            let mut unfinalised = false;
            if let Some(pos) = lists.active.iter().position(|&a| a == actor) {
                lists.active.swap_remove(pos);
            } else if lists.deferred.remove(&actor) {
                unfinalised = true;
            } else if lists.available.contains(&actor) || lists.in_flight.contains(&actor) {
                log::warn!("{actor} was already returned to {} pool", self.class.name());
                return false;
            } else {
                log::debug!("Adopting untracked {actor} into {} pool", self.class.name());
            }
            lists.in_flight.insert(actor);
            unfinalised
        };

        let start = Instant::now();
        let result = if unfinalised {
            // Not activated since it left the pool, so there is nothing to notify
            reset::park(&self.world, actor)
        } else {
            let _scope = DispatchScope::enter(self.id);
            reset::reset_for_pooling(&self.world, actor)
        };
        self.reset_stats
            .lock()
            .record(start.elapsed(), result.is_ok());

        let mut lists = self.lists.write();
        lists.in_flight.remove(&actor);

        if let Err(e) = result {
            self.rearm_overflow_warning(&lists);
            drop(lists);
            log::warn!("Reset of {actor} for {} pool failed: {e}", self.class.name());
            self.world.destroy(actor);
            return false;
        }

        if lists.hard_limit > 0 && lists.available.len() >= lists.hard_limit {
            self.rearm_overflow_warning(&lists);
            drop(lists);
            self.world.destroy(actor);
            log::debug!("{} pool full, destroyed returned {actor}", self.class.name());
            return true;
        }

        lists.available.push(actor);
        self.rearm_overflow_warning(&lists);
        true
    }

    // ========================================================================
    // Population
    // ========================================================================

    /// Construct up to `count` parked actors directly into the free list.
    ///
    /// Bounded by the hard limit. No lifecycle events fire. Returns the
    /// number added.
    pub fn prewarm(&self, count: usize) -> usize {
        if count == 0 || !self.check_usable("prewarm") {
            return 0;
        }

        let room = {
            let lists = self.lists.read();
            if lists.hard_limit == 0 {
                count
            } else {
                lists.hard_limit.saturating_sub(lists.managed()).min(count)
            }
        };

        let mut created = Vec::with_capacity(room);
        for _ in 0..room {
            match self.create_object() {
                Ok(actor) => match reset::park(&self.world, actor) {
                    Ok(()) => created.push(actor),
                    Err(e) => log::warn!("Prewarmed {actor} could not be parked: {e}"),
                },
                Err(e) => {
                    log::warn!("Prewarm of {} pool stopped: {e}", self.class.name());
                    break;
                }
            }
        }

        let mut lists = self.lists.write();
        let mut added = 0;
        for actor in created {
            // Another thread may have filled the pool meanwhile
            if lists.at_limit() {
                self.world.destroy(actor);
            } else {
                lists.available.push(actor);
                added += 1;
            }
        }
        drop(lists);

        log::debug!("Prewarmed {added} actors into {} pool", self.class.name());
        added
    }

    /// Destroy every pooled actor and zero the counters
    pub fn clear(&self) {
        if guard::is_dispatching(self.id) {
            log::warn!(
                "{}",
                PoolError::Contention(format!("clear of {} pool from its own handler", self.class.name()))
            );
            return;
        }
        self.stop_preallocation();

        let doomed: Vec<ActorHandle> = {
            let mut lists = self.lists.write();
            let mut doomed = std::mem::take(&mut lists.available);
            doomed.append(&mut lists.active);
            doomed.extend(lists.deferred.drain());
            doomed
        };

        let destroyed = doomed
            .into_iter()
            .filter(|&actor| self.world.destroy(actor))
            .count();

        self.total_requests.store(0, Ordering::Relaxed);
        self.pool_hits.store(0, Ordering::Relaxed);
        self.total_created.store(0, Ordering::Relaxed);
        self.overflow_warned.store(false, Ordering::Release);
        log::info!("Cleared {} pool, destroyed {destroyed} actors", self.class.name());
    }

    /// Change the hard limit, evicting parked actors until the pool fits.
    ///
    /// Active actors are never evicted.
    pub fn set_max_size(&self, max_size: usize) {
        if max_size == 0 {
            log::warn!("Ignoring max size 0 for {} pool", self.class.name());
            return;
        }

        let evicted: Vec<ActorHandle> = {
            let mut lists = self.lists.write();
            lists.hard_limit = max_size;
            let mut evicted = Vec::new();
            while lists.managed() > max_size {
                match lists.available.pop() {
                    Some(actor) => evicted.push(actor),
                    None => break,
                }
            }
            self.rearm_overflow_warning(&lists);
            evicted
        };

        for &actor in &evicted {
            self.world.destroy(actor);
        }
        log::info!(
            "{} pool max size set to {max_size}, evicted {}",
            self.class.name(),
            evicted.len()
        );
    }

    /// Sweep tombstones from both lists. Returns the number removed.
    pub fn cleanup_invalid(&self) -> usize {
        let mut lists = self.lists.write();
        let removed = lists.sweep(&self.world);
        self.rearm_overflow_warning(&lists);
        if removed > 0 {
            log::debug!("Swept {removed} tombstones from {} pool", self.class.name());
        }
        removed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let lists = self.lists.read();
        // Hits trail requests, so reading hits first keeps hits <= requests
        let pool_hits = self.pool_hits.load(Ordering::Acquire);
        let total_requests = self.total_requests.load(Ordering::Acquire);
        let current_active = lists.active.len() + lists.deferred.len();
        let current_available = lists.available.len();

        PoolStats {
            class_name: self.class.name().to_string(),
            total_created: self.total_created.load(Ordering::Relaxed),
            current_active,
            current_available,
            pool_size: current_active + current_available,
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                (pool_hits as f32 / total_requests as f32).min(1.0)
            },
            total_requests,
            pool_hits,
        }
    }

    /// Reset timing statistics
    #[must_use]
    pub fn reset_stats(&self) -> ResetStats {
        self.reset_stats.lock().clone()
    }

    /// Parked actors (including tombstones)
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.lists.read().available.len()
    }

    /// Handed-out actors (including those awaiting finalisation)
    #[must_use]
    pub fn active_count(&self) -> usize {
        let lists = self.lists.read();
        lists.active.len() + lists.deferred.len()
    }

    /// Active plus available
    #[must_use]
    pub fn pool_size(&self) -> usize {
        let lists = self.lists.read();
        lists.active.len() + lists.deferred.len() + lists.available.len()
    }

    /// Whether no actor is parked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.read().available.is_empty()
    }

    /// Whether the pool has reached its hard limit
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lists.read().at_limit()
    }

    /// Whether the pool tracks `actor` in any state
    #[must_use]
    pub fn contains(&self, actor: ActorHandle) -> bool {
        self.lists.read().is_tracked(actor)
    }

    /// Whether `actor` is currently handed out
    #[must_use]
    pub fn is_active(&self, actor: ActorHandle) -> bool {
        let lists = self.lists.read();
        lists.active.contains(&actor) || lists.deferred.contains(&actor)
    }

    /// Append every handed-out actor to `out` (GC root reporting)
    pub fn report_active(&self, out: &mut Vec<ActorHandle>) {
        let lists = self.lists.read();
        out.extend(lists.active.iter().chain(&lists.deferred).chain(&lists.in_flight));
    }

    /// `(live, entries)` across both lists; entries minus live are tombstones
    #[must_use]
    pub fn tombstone_counts(&self) -> (usize, usize) {
        let lists = self.lists.read();
        let entries = lists.available.len() + lists.active.len();
        let live = lists
            .available
            .iter()
            .chain(&lists.active)
            .filter(|&&actor| self.world.is_valid(actor))
            .count();
        (live, entries)
    }

    /// Estimated bytes held by the pool and its actors
    #[must_use]
    pub fn calculate_memory_usage(&self) -> u64 {
        self.projected_memory_usage(0)
    }

    /// Estimated bytes after `extra` more actors are added
    #[must_use]
    pub fn projected_memory_usage(&self, extra: usize) -> u64 {
        let entries = {
            let lists = self.lists.read();
            lists.available.len() + lists.active.len() + lists.deferred.len()
        } + extra;

        std::mem::size_of::<Self>() as u64
            + (entries * std::mem::size_of::<ActorHandle>()) as u64
            + reset::estimate_memory_usage(Some(&self.class), entries)
    }

    // ========================================================================
    // Preallocation
    // ========================================================================

    /// Attach and start a preallocator, replacing any previous one.
    ///
    /// Returns whether the preallocator accepted the config.
    pub fn attach_preallocator(self: &Arc<Self>, config: PreallocConfig) -> bool {
        self.stop_preallocation();

        let preallocator = Preallocator::new(self);
        let started = preallocator.start(config);
        if started {
            *self.preallocator.lock() = Some(preallocator);
        }
        started
    }

    /// Advance the attached preallocator by `delta_seconds`
    pub fn tick(&self, delta_seconds: f32) {
        if let Some(preallocator) = self.preallocator.lock().as_ref() {
            preallocator.tick(delta_seconds);
        }
    }

    /// Stop the attached preallocator, keeping its statistics
    pub fn stop_preallocation(&self) {
        if let Some(preallocator) = self.preallocator.lock().as_ref() {
            preallocator.stop();
        }
    }

    /// Whether an attached preallocator is still running
    #[must_use]
    pub fn is_preallocating(&self) -> bool {
        self.preallocator
            .lock()
            .as_ref()
            .is_some_and(Preallocator::is_active)
    }

    /// Statistics of the attached preallocator
    #[must_use]
    pub fn preallocation_stats(&self) -> Option<PreallocStats> {
        self.preallocator.lock().as_ref().map(Preallocator::stats)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn check_usable(&self, operation: &str) -> bool {
        if !self.initialized {
            log::warn!(
                "{operation} on {} pool: {}",
                self.class.name(),
                PoolError::NotInitialised
            );
            return false;
        }
        if guard::is_dispatching(self.id) {
            log::warn!(
                "{}",
                PoolError::Contention(format!(
                    "{operation} on {} pool from its own lifecycle handler",
                    self.class.name()
                ))
            );
            return false;
        }
        true
    }

    fn check_object(&self, actor: ActorHandle) -> PoolResult<()> {
        let class = self.world.class_of(actor).ok_or(PoolError::InvalidObject)?;
        if !self.world.is_valid(actor) {
            return Err(PoolError::InvalidObject);
        }
        if class != self.class {
            return Err(PoolError::WrongClass {
                expected: self.class.name().to_string(),
                found: class.name().to_string(),
            });
        }
        Ok(())
    }

    /// Pop the most recently parked live actor into `in_flight`, dropping
    /// tombstones found on the way.
    fn take_available(&self, request: u64) -> Option<ActorHandle> {
        let mut lists = self.lists.write();
        if request % CLEANUP_FREQUENCY == 0 {
            lists.sweep(&self.world);
        }

        while let Some(actor) = lists.available.pop() {
            if self.world.is_valid(actor) {
                lists.in_flight.insert(actor);
                return Some(actor);
            }
        }
        None
    }

    /// Spawn a deferred actor and mark it in flight, warning once if the
    /// pool is already at its hard limit.
    fn construct_in_flight(&self) -> PoolResult<ActorHandle> {
        {
            let lists = self.lists.read();
            if lists.at_limit() && !self.overflow_warned.swap(true, Ordering::AcqRel) {
                log::warn!(
                    "{} pool: {}, constructing anyway",
                    self.class.name(),
                    PoolError::Overflow {
                        limit: lists.hard_limit,
                        size: lists.managed(),
                    }
                );
            }
        }

        let actor = self.create_object()?;
        self.lists.write().in_flight.insert(actor);
        Ok(actor)
    }

    fn create_object(&self) -> PoolResult<ActorHandle> {
        let actor = self
            .world
            .spawn_deferred(&self.class, &reset::parking_transform())?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(actor)
    }

    fn activate(&self, actor: ActorHandle, transform: &Transform) -> PoolResult<()> {
        let _scope = DispatchScope::enter(self.id);
        reset::activate(&self.world, actor, transform)
    }

    /// A constructed actor can still be handed out while the world tears down
    fn can_basic_reset(&self, actor: ActorHandle) -> bool {
        self.world.is_tearing_down() && self.world.is_deferred(actor) == Some(false)
    }

    fn land_active(&self, actor: ActorHandle) {
        let mut lists = self.lists.write();
        lists.in_flight.remove(&actor);
        lists.active.push(actor);
    }

    fn discard(&self, actor: ActorHandle) {
        {
            let mut lists = self.lists.write();
            lists.in_flight.remove(&actor);
            self.rearm_overflow_warning(&lists);
        }
        self.world.destroy(actor);
    }

    fn rearm_overflow_warning(&self, lists: &PoolLists) {
        if !lists.at_limit() {
            self.overflow_warned.store(false, Ordering::Release);
        }
    }
}

impl Drop for ActorPool {
    fn drop(&mut self) {
        if let Some((gc, id)) = self.gc_hook.take() {
            gc.unsubscribe(id);
        }

        // Parked actors belong to the pool; active ones stay with their callers
        let lists = self.lists.get_mut();
        let parked = lists.available.len();
        for actor in lists.available.drain(..) {
            self.world.destroy(actor);
        }
        log::debug!("Dropped {} pool, destroyed {parked} parked actors", self.class.name());
    }
}

impl std::fmt::Debug for ActorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorPool")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("initialized", &self.initialized)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{HandlerResult, LifecycleEvent, Poolable};
    use crate::scene::{ClassBuilder, SpawnValue};
    use crate::testing::{self, EventLog, RecordingHandler};
    use glam::Vec3;
    use std::sync::{Barrier, OnceLock};

    fn setup(initial: usize, hard: usize) -> (Arc<World>, EventLog, Arc<ActorPool>) {
        let world = Arc::new(World::new("Test"));
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let config = PoolConfig::new(class)
            .with_initial_size(initial)
            .with_hard_limit(hard);
        let pool = ActorPool::new(world.clone(), config);
        (world, log, pool)
    }

    fn at(x: f32) -> Transform {
        Transform::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_cold_start_constructs() {
        let (world, log, pool) = setup(5, 10);

        let handles: Vec<_> = (0..3).filter_map(|i| pool.acquire(&at(i as f32))).collect();

        assert_eq!(handles.len(), 3);
        assert!(handles.iter().all(|&h| world.is_valid(h)));
        let stats = pool.stats();
        assert_eq!(stats.total_created, 3);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.current_active, 3);
        assert_eq!(log.count(LifecycleEvent::Created), 3);
        assert_eq!(log.count(LifecycleEvent::Activated), 3);
    }

    #[test]
    fn test_warm_reuse_is_lifo() {
        let (_world, log, pool) = setup(5, 10);
        assert_eq!(pool.prewarm(5), 5);
        assert_eq!(log.count(LifecycleEvent::Created), 0, "Prewarm fires no events");

        let first: Vec<_> = (0..3).filter_map(|_| pool.acquire(&at(0.0))).collect();
        for &h in &first {
            assert!(pool.release(h));
        }
        let second: Vec<_> = (0..3).filter_map(|_| pool.acquire(&at(0.0))).collect();

        let expected: Vec<_> = first.iter().rev().copied().collect();
        assert_eq!(second, expected, "Last returned is first reused");

        let stats = pool.stats();
        assert_eq!(stats.total_created, 5);
        assert!(stats.hit_rate >= 6.0 / 9.0);

        for &h in &first {
            assert_eq!(
                log.events_for(h),
                vec![
                    LifecycleEvent::Created,
                    LifecycleEvent::Activated,
                    LifecycleEvent::ReturnedToPool,
                    LifecycleEvent::Activated,
                ]
            );
        }
    }

    #[test]
    fn test_hard_limit_overflow_warns_once() {
        testing::capture_warnings();
        let (world, _log, pool) = setup(2, 3);
        pool.prewarm(3);

        let handles: Vec<_> = (0..5).filter_map(|_| pool.acquire(&at(0.0))).collect();

        let unique: FxHashSet<_> = handles.iter().copied().collect();
        assert_eq!(unique.len(), 5);
        assert!(handles.iter().all(|&h| world.is_valid(h)));
        let stats = pool.stats();
        assert_eq!(stats.total_created, 5);
        assert_eq!(stats.current_active, 5);

        let overflow_warnings = testing::warnings()
            .iter()
            .filter(|w| w.contains("hard limit"))
            .count();
        assert_eq!(overflow_warnings, 1);

        // Returns beyond the limit are destroyed
        for &h in &handles {
            assert!(pool.release(h));
        }
        assert_eq!(pool.available_count(), 3);
        assert_eq!(world.count_of(pool.class()), 3);
    }

    #[test]
    fn test_gc_mid_flight_skips_tombstones() {
        let world = Arc::new(World::new("Test"));
        let gc = Arc::new(GarbageCollector::new());
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let pool = ActorPool::with_gc(
            world.clone(),
            PoolConfig::new(class).with_initial_size(10).with_hard_limit(0),
            &gc,
        );
        pool.prewarm(10);

        // Reclaim four parked actors behind the pool's back
        let parked = pool.lists.read().available.clone();
        for &h in parked.iter().step_by(3) {
            world.mark_unreachable(h);
        }
        assert_eq!(gc.collect(&world), 4);

        let handles: Vec<_> = (0..6).filter_map(|_| pool.acquire(&at(0.0))).collect();
        assert_eq!(handles.len(), 6);
        assert!(handles.iter().all(|&h| world.is_valid(h)));

        let created = pool.stats().total_created;
        assert!((10..=13).contains(&created));

        // The next collection's pre-collect sweep clears what acquire skipped
        gc.collect(&world);
        let (live, entries) = pool.tombstone_counts();
        assert_eq!(live, entries, "No tombstones left");
        assert_eq!(live, 6);
    }

    #[test]
    fn test_gc_hook_sweeps_and_unsubscribes_on_drop() {
        let world = Arc::new(World::new("Test"));
        let gc = Arc::new(GarbageCollector::new());
        let class = ClassBuilder::new("Crate").build();
        let pool = ActorPool::with_gc(world.clone(), PoolConfig::new(class.clone()), &gc);
        let actor = pool.acquire(&at(0.0)).expect("acquire");

        world.destroy(actor);
        assert_eq!(pool.tombstone_counts(), (0, 1));
        gc.collect(&world);
        assert_eq!(pool.active_count(), 0, "Pre-collect hook swept the tombstone");

        assert_eq!(gc.hook_count(), 1);
        drop(pool);
        assert_eq!(gc.hook_count(), 0);
    }

    #[test]
    fn test_wrong_class_return_rejected() {
        testing::capture_warnings();
        let (world, _log, pool) = setup(5, 10);
        pool.prewarm(2);
        let other = ClassBuilder::new("Rocket").build();
        let foreign = world.spawn(&other, &at(0.0)).expect("spawn");

        assert!(!pool.release(foreign));
        assert_eq!(pool.available_count(), 2);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(testing::warnings().len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_hands_out_unique_actors() {
        let (_world, _log, pool) = setup(40, 0);
        assert_eq!(pool.prewarm(40), 40);
        let barrier = Barrier::new(4);

        let per_thread: Vec<Vec<ActorHandle>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let got: Vec<_> = (0..10).filter_map(|_| pool.acquire(&at(1.0))).collect();
                        barrier.wait();
                        for &h in &got {
                            assert!(pool.release(h));
                        }
                        got
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("worker panicked"))
                .collect()
        });

        let unique: FxHashSet<_> = per_thread.iter().flatten().copied().collect();
        assert_eq!(unique.len(), 40);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.available_count(), 40);
        assert_eq!(pool.stats().total_created, 40);
    }

    #[test]
    fn test_double_return_is_rejected() {
        let (_world, log, pool) = setup(5, 10);
        let actor = pool.acquire(&at(0.0)).expect("acquire");

        assert!(pool.release(actor));
        assert!(!pool.release(actor), "Second return must be refused");
        assert_eq!(pool.available_count(), 1);
        assert_eq!(log.count(LifecycleEvent::ReturnedToPool), 1);
    }

    #[test]
    fn test_set_max_size_evicts_only_available() {
        let (world, _log, pool) = setup(5, 10);
        pool.prewarm(6);
        let held: Vec<_> = (0..3).filter_map(|_| pool.acquire(&at(0.0))).collect();

        pool.set_max_size(4);

        assert_eq!(pool.active_count(), 3);
        assert_eq!(pool.available_count(), 1);
        assert!(held.iter().all(|&h| world.is_valid(h)));

        pool.set_max_size(1);
        assert_eq!(pool.active_count(), 3, "Active actors are never evicted");
        assert_eq!(pool.available_count(), 0);
    }

    #[test]
    fn test_prewarm_respects_hard_limit() {
        let (_world, _log, pool) = setup(2, 4);
        assert_eq!(pool.prewarm(10), 4);
        assert!(pool.is_full());
        assert_eq!(pool.prewarm(1), 0);
    }

    #[test]
    fn test_clear_destroys_everything_and_zeroes_counters() {
        let (world, _log, pool) = setup(5, 10);
        pool.prewarm(3);
        let held = pool.acquire(&at(0.0)).expect("acquire");

        pool.clear();

        assert!(!world.is_valid(held));
        assert_eq!(pool.pool_size(), 0);
        assert_eq!(pool.stats(), PoolStats {
            class_name: "Bullet".to_string(),
            ..Default::default()
        });
    }

    #[test]
    fn test_invalid_config_is_not_initialised() {
        testing::capture_warnings();
        let (_world, _log, pool) = setup(0, 10);

        assert!(!pool.is_initialized());
        assert!(pool.acquire(&at(0.0)).is_none());
        assert_eq!(pool.prewarm(3), 0);
        assert!(testing::warnings()[0].contains("not initialised"));
    }

    #[test]
    fn test_deferred_acquire_then_finalize() {
        let (world, log, pool) = setup(5, 10);
        let actor = pool.acquire_deferred().expect("acquire");
        assert!(log.events_for(actor).is_empty(), "No events before finalize");
        assert!(pool.is_active(actor));

        world.set_spawn_param(actor, "damage", SpawnValue::Int(40));
        assert!(pool.finalize_deferred(actor, &at(3.0)));

        assert_eq!(
            log.events_for(actor),
            vec![LifecycleEvent::Created, LifecycleEvent::Activated]
        );
        assert_eq!(
            log.last_params(actor).and_then(|p| p.int("damage")),
            Some(40)
        );
        assert!(!pool.finalize_deferred(actor, &at(3.0)), "Already active");
    }

    #[test]
    fn test_activation_failure_discards_reused_actor() {
        let (world, _log, pool) = setup(5, 10);
        pool.prewarm(1);
        let parked = pool.lists.read().available[0];

        world.begin_teardown();
        assert!(pool.acquire(&at(0.0)).is_none());
        assert!(!world.exists(parked), "Failed reuse is destroyed");
        assert_eq!(pool.pool_size(), 0);
    }

    #[test]
    fn test_teardown_reuse_falls_back_to_basic_reset() {
        testing::capture_warnings();
        let (world, log, pool) = setup(5, 10);
        let actor = pool.acquire(&at(0.0)).expect("acquire");
        assert!(pool.release(actor));

        world.begin_teardown();
        let reused = pool.acquire(&at(7.0)).expect("basic reset keeps the actor usable");

        assert_eq!(reused, actor);
        let snap = world.snapshot(actor).expect("snapshot");
        assert!(snap.visible);
        assert_eq!(snap.transform, at(7.0));
        assert_eq!(log.count(LifecycleEvent::Activated), 1, "No events on the fallback");
        assert_eq!(pool.active_count(), 1);
        assert!(testing::warnings().iter().any(|w| w.contains("basic reset")));
        assert!(pool.release(actor));
    }

    #[test]
    fn test_unfinalised_return_fires_no_events() {
        let (_world, log, pool) = setup(5, 10);
        let actor = pool.acquire_deferred().expect("acquire");
        assert!(pool.release(actor));
        assert!(log.events_for(actor).is_empty());

        let reused = pool.acquire(&at(0.0)).expect("acquire");
        assert_eq!(reused, actor);
        assert_eq!(
            log.events_for(actor),
            vec![LifecycleEvent::Created, LifecycleEvent::Activated]
        );
    }

    #[test]
    fn test_unfinalised_reuse_is_not_returned_twice() {
        let (_world, log, pool) = setup(5, 10);
        let actor = pool.acquire(&at(0.0)).expect("acquire");
        assert!(pool.release(actor));

        assert_eq!(pool.acquire_deferred(), Some(actor));
        assert!(pool.release(actor));
        assert_eq!(pool.acquire(&at(0.0)), Some(actor));

        assert_eq!(
            log.events_for(actor),
            vec![
                LifecycleEvent::Created,
                LifecycleEvent::Activated,
                LifecycleEvent::ReturnedToPool,
                LifecycleEvent::Activated,
            ]
        );
    }

    fn failing_pool(event: LifecycleEvent) -> (EventLog, Arc<ActorPool>) {
        let world = Arc::new(World::new("Test"));
        let log = EventLog::default();
        let class = RecordingHandler::failing_class("Bullet", &log, event);
        let pool = ActorPool::new(world, PoolConfig::new(class));
        (log, pool)
    }

    fn handler_failures() -> usize {
        testing::warnings()
            .iter()
            .filter(|w| w.contains("Lifecycle handler failed"))
            .count()
    }

    #[test]
    fn test_failing_activation_handler_still_hands_out_actor() {
        testing::capture_warnings();
        let (log, pool) = failing_pool(LifecycleEvent::Activated);

        let actor = pool.acquire(&at(0.0)).expect("acquire");

        assert_eq!(handler_failures(), 1);
        assert_eq!(
            log.events_for(actor),
            vec![LifecycleEvent::Created, LifecycleEvent::Activated]
        );
        assert_eq!(pool.active_count(), 1);
        assert!(pool.release(actor));
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.stats().total_created, 1);
    }

    #[test]
    fn test_failing_return_handler_still_parks_actor() {
        testing::capture_warnings();
        let (log, pool) = failing_pool(LifecycleEvent::ReturnedToPool);
        let actor = pool.acquire(&at(0.0)).expect("acquire");

        assert!(pool.release(actor));

        assert_eq!(handler_failures(), 1);
        assert_eq!(log.count(LifecycleEvent::ReturnedToPool), 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.available_count(), 1);

        assert_eq!(pool.acquire(&at(0.0)), Some(actor));
        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_mixed_acquire_return_sequence_balances() {
        let (world, _log, pool) = setup(4, 8);
        let mut held = Vec::new();
        let mut seen = FxHashSet::default();
        let mut seed: u32 = 0x9E37_79B9;

        for _ in 0..500 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let roll = (seed >> 16) as usize;
            if held.is_empty() || roll % 2 == 0 {
                let actor = pool.acquire(&at(0.0)).expect("acquire");
                seen.insert(actor);
                held.push(actor);
            } else {
                let actor = held.swap_remove(roll % held.len());
                assert!(pool.release(actor));
            }
        }
        for actor in held.drain(..) {
            assert!(pool.release(actor));
        }

        let destroyed = seen.iter().filter(|&&h| !world.is_valid(h)).count() as u64;
        let stats = pool.stats();
        assert_eq!(stats.current_active, 0);
        assert_eq!(stats.current_available as u64, stats.total_created - destroyed);
        assert_eq!(world.count_of(pool.class()), stats.current_available);
    }

    #[test]
    fn test_hit_rate_rises_in_steady_state() {
        let (_world, _log, pool) = setup(4, 8);
        let mut last = 0.0;

        for round in 0..50 {
            let held: Vec<_> = (0..4).filter_map(|_| pool.acquire(&at(0.0))).collect();
            for &h in &held {
                assert!(pool.release(h));
            }
            let rate = pool.stats().hit_rate;
            assert!(rate >= last, "Round {round}: hit rate fell from {last} to {rate}");
            last = rate;
        }

        assert!(last > 0.95);
        assert_eq!(pool.stats().total_created, 4);
    }

    #[test]
    fn test_hit_rate_stays_bounded_under_contention() {
        let (_world, _log, pool) = setup(8, 0);
        pool.prewarm(8);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        if let Some(h) = pool.acquire(&at(0.0)) {
                            assert!(pool.release(h));
                        }
                        let rate = pool.stats().hit_rate;
                        assert!((0.0..=1.0).contains(&rate), "Hit rate {rate} out of range");
                    }
                });
            }
        });

        assert!(pool.stats().pool_hits <= pool.stats().total_requests);
    }

    #[test]
    fn test_return_of_pending_kill_actor_rejected() {
        let world = Arc::new(World::new("Test"));
        let log = EventLog::default();
        let class = RecordingHandler::class("Bullet", &log);
        let pool = ActorPool::new(world.clone(), PoolConfig::new(class));
        let actor = pool.acquire(&at(0.0)).expect("acquire");

        world.mark_pending_kill(actor);
        assert!(!pool.release(actor));
        assert_eq!(pool.available_count(), 0);
    }

    struct Reentrant {
        own: Arc<OnceLock<Weak<ActorPool>>>,
        other: Arc<ActorPool>,
        results: Arc<parking_lot::Mutex<Vec<(bool, bool)>>>,
    }

    impl Poolable for Reentrant {
        fn on_activated(&mut self, _actor: ActorHandle) -> HandlerResult {
            let own = self
                .own
                .get()
                .and_then(Weak::upgrade)
                .and_then(|pool| pool.acquire(&Transform::IDENTITY));
            let other = self.other.acquire(&Transform::IDENTITY);
            self.results.lock().push((own.is_some(), other.is_some()));
            Ok(())
        }
    }

    #[test]
    fn test_reentry_refused_for_own_pool_only() {
        testing::capture_warnings();
        let world = Arc::new(World::new("Test"));
        let other = ActorPool::new(
            world.clone(),
            PoolConfig::new(ClassBuilder::new("Spark").build()),
        );
        let own = Arc::new(OnceLock::new());
        let results = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let class = {
            let (own, other, results) = (own.clone(), other.clone(), results.clone());
            ClassBuilder::new("Emitter")
                .with_handler(move || Reentrant {
                    own: own.clone(),
                    other: other.clone(),
                    results: results.clone(),
                })
                .build()
        };
        let pool = ActorPool::new(world.clone(), PoolConfig::new(class));
        let _ = own.set(Arc::downgrade(&pool));

        assert!(pool.acquire(&Transform::IDENTITY).is_some());
        assert_eq!(*results.lock(), vec![(false, true)]);
        assert!(
            testing::warnings()
                .iter()
                .any(|w| w.contains("Contention"))
        );
        assert_eq!(other.active_count(), 1);
    }

    #[test]
    fn test_memory_usage_grows_with_pool() {
        let (_world, _log, pool) = setup(5, 10);
        let empty = pool.calculate_memory_usage();
        pool.prewarm(2);
        let footprint = reset::object_footprint(pool.class());

        assert!(pool.calculate_memory_usage() >= empty + 2 * footprint);
        let handle_size = std::mem::size_of::<ActorHandle>() as u64;
        assert_eq!(
            pool.projected_memory_usage(1),
            pool.calculate_memory_usage() + footprint + handle_size
        );
    }
}
