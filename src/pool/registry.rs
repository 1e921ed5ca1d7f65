//! Registry of per-class pools
//!
//! The application owns one [`PoolRegistry`] per world and passes it to call
//! sites. It creates pools on demand, spreads initial prewarming over ticks,
//! drives attached preallocators and keeps a single garbage-collector
//! subscription for all of its pools.
//!
//! # Example
//!
//! ```ignore
//! let registry = PoolRegistry::with_gc(world.clone(), &gc);
//! registry.register_class(bullet.clone(), 50, 200);
//!
//! // Every frame
//! registry.tick(dt);
//! let shot = registry.spawn_from_pool(&bullet, &Transform::from_position(muzzle));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::actor_pool::ActorPool;
use super::config::{PoolConfig, RegistryConfig};
use super::reset;
use super::stats::PoolStats;
use crate::error::{PoolError, PoolResult};
use crate::prealloc::PreallocConfig;
use crate::scene::{ActorClass, ActorHandle, GarbageCollector, GcHookId, Transform, World};

/// Most actors prewarmed per pool per tick while registration prewarm is pending
pub const PREWARM_BATCH: usize = 10;

type PoolMap = FxHashMap<ActorClass, Arc<ActorPool>>;

/// Registry-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub spawn_calls: u64,
    pub return_calls: u64,
    pub pools_created: u64,
    /// Spawns served by a pool
    pub pool_hits: u64,
    /// Spawns that bypassed the pool and went straight to the world
    pub fallback_spawns: u64,
}

#[derive(Default)]
struct Counters {
    spawn_calls: AtomicU64,
    return_calls: AtomicU64,
    pools_created: AtomicU64,
    pool_hits: AtomicU64,
    fallback_spawns: AtomicU64,
}

#[derive(Serialize)]
struct DebugSnapshot<'a> {
    world: &'a str,
    registry: RegistryStats,
    pools: Vec<PoolStats>,
}

struct GcSubscription {
    gc: Arc<GarbageCollector>,
    sweep: GcHookId,
    roots: GcHookId,
}

/// Owner of every pool for one [`World`]
pub struct PoolRegistry {
    world: Arc<World>,
    pools: Arc<RwLock<PoolMap>>,
    /// Pools still owed registration prewarm, with the remaining count
    pending_prewarm: Mutex<VecDeque<(Arc<ActorPool>, usize)>>,
    counters: Counters,
    gc: Option<GcSubscription>,
}

impl PoolRegistry {
    /// Create a registry without garbage-collector integration
    #[must_use]
    pub fn new(world: Arc<World>) -> Self {
        Self {
            world,
            pools: Arc::new(RwLock::new(PoolMap::default())),
            pending_prewarm: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
            gc: None,
        }
    }

    /// Create a registry that sweeps its pools before every collection of
    /// `gc` and reports handed-out actors as roots
    #[must_use]
    pub fn with_gc(world: Arc<World>, gc: &Arc<GarbageCollector>) -> Self {
        let mut registry = Self::new(world);

        let weak = Arc::downgrade(&registry.pools);
        let sweep = gc.subscribe_pre_collect(move || {
            let Some(pools) = weak.upgrade() else {
                return;
            };
            let pools: Vec<Arc<ActorPool>> = pools.read().values().cloned().collect();
            for pool in pools {
                pool.cleanup_invalid();
            }
        });

        let weak = Arc::downgrade(&registry.pools);
        let roots = gc.add_reference_reporter(move |out| {
            if let Some(pools) = weak.upgrade() {
                for pool in pools.read().values() {
                    pool.report_active(out);
                }
            }
        });

        registry.gc = Some(GcSubscription {
            gc: Arc::clone(gc),
            sweep,
            roots,
        });
        registry
    }

    /// World the registry's pools spawn into
    #[must_use]
    #[inline]
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Create a pool for `class`. An `initial_size` of 0 takes the class
    /// defaults. Prewarm is spread over the following ticks.
    ///
    /// Returns true if the class is pooled afterwards, including when it
    /// already was.
    pub fn register_class(&self, class: ActorClass, initial_size: usize, hard_limit: usize) -> bool {
        let mut config = PoolConfig::new(class).with_hard_limit(hard_limit);
        config.initial_size = initial_size;
        config.apply_defaults();
        self.register_with_config(config)
    }

    /// Create a pool from a full config. See [`register_class`](Self::register_class).
    pub fn register_with_config(&self, config: PoolConfig) -> bool {
        match self.try_register(config) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Pool registration failed: {e}");
                false
            }
        }
    }

    fn try_register(&self, config: PoolConfig) -> PoolResult<Arc<ActorPool>> {
        if let Some(pool) = self.get_pool(&config.class) {
            log::debug!("{} is already pooled", config.class.name());
            return Ok(pool);
        }
        config.validate()?;
        self.world.register_class(&config.class);

        let class = config.class.clone();
        let prewarm = config.enable_prewarm.then_some(config.initial_size);
        let pool = {
            let mut pools = self.pools.write();
            // Another thread may have registered meanwhile
            if let Some(pool) = pools.get(&class) {
                return Ok(Arc::clone(pool));
            }
            let pool = ActorPool::new(Arc::clone(&self.world), config);
            if !pool.is_initialized() {
                return Err(PoolError::NotInitialised);
            }
            pools.insert(class, Arc::clone(&pool));
            pool
        };
        self.counters.pools_created.fetch_add(1, Ordering::Relaxed);

        if let Some(count) = prewarm {
            self.pending_prewarm.lock().push_back((Arc::clone(&pool), count));
        }
        Ok(pool)
    }

    /// Register every pool in `config`, attaching preallocators where given.
    /// Returns the number of entries that produced a pool.
    pub fn load_config(&self, config: &RegistryConfig) -> usize {
        let mut loaded = 0;
        for entry in &config.pools {
            let pool = match entry.resolve(&self.world).and_then(|c| self.try_register(c)) {
                Ok(pool) => pool,
                Err(e) => {
                    log::warn!("Skipping pool entry for '{}': {e}", entry.class);
                    continue;
                }
            };
            if let Some(prealloc) = &entry.preallocation
                && !pool.attach_preallocator(prealloc.clone())
            {
                log::warn!("Preallocator for {} was not started", pool.class().name());
            }
            loaded += 1;
        }
        log::info!("Loaded {loaded}/{} pool entries", config.pools.len());
        loaded
    }

    /// Parse a RON document and [`load_config`](Self::load_config) it
    pub fn load_ron(&self, source: &str) -> PoolResult<usize> {
        let config = RegistryConfig::from_ron_str(source)?;
        Ok(self.load_config(&config))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Pool for `class`, if registered
    #[must_use]
    pub fn get_pool(&self, class: &ActorClass) -> Option<Arc<ActorPool>> {
        self.pools.read().get(class).cloned()
    }

    /// Pool for `class`, registering one with the class defaults if needed
    pub fn get_or_create_pool(&self, class: &ActorClass) -> Option<Arc<ActorPool>> {
        if let Some(pool) = self.get_pool(class) {
            return Some(pool);
        }
        match self.try_register(PoolConfig::new(class.clone())) {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Cannot pool {}: {e}", class.name());
                None
            }
        }
    }

    /// Whether `class` has a pool
    #[must_use]
    pub fn is_pooled(&self, class: &ActorClass) -> bool {
        self.pools.read().contains_key(class)
    }

    /// Number of pools
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    // ========================================================================
    // Spawn / Return
    // ========================================================================

    /// Acquire an activated actor of `class`.
    ///
    /// Falls back to a plain world spawn when the pool cannot serve the
    /// request. Returns `None` only when the world itself refuses.
    pub fn spawn_from_pool(&self, class: &ActorClass, transform: &Transform) -> Option<ActorHandle> {
        self.counters.spawn_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(actor) = self
            .get_or_create_pool(class)
            .and_then(|pool| pool.acquire(transform))
        {
            self.counters.pool_hits.fetch_add(1, Ordering::Relaxed);
            return Some(actor);
        }

        match self.world.spawn(class, transform) {
            Ok(actor) => {
                self.counters.fallback_spawns.fetch_add(1, Ordering::Relaxed);
                log::debug!("Spawned {actor} of {} outside its pool", class.name());
                Some(actor)
            }
            Err(e) => {
                log::warn!("Spawn of {} failed: {e}", class.name());
                None
            }
        }
    }

    /// Acquire an actor of `class` awaiting [`finalize_spawn`](Self::finalize_spawn)
    pub fn acquire_deferred(&self, class: &ActorClass) -> Option<ActorHandle> {
        self.counters.spawn_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(actor) = self
            .get_or_create_pool(class)
            .and_then(|pool| pool.acquire_deferred())
        {
            self.counters.pool_hits.fetch_add(1, Ordering::Relaxed);
            return Some(actor);
        }

        match self.world.spawn_deferred(class, &reset::parking_transform()) {
            Ok(actor) => {
                self.counters.fallback_spawns.fetch_add(1, Ordering::Relaxed);
                Some(actor)
            }
            Err(e) => {
                log::warn!("Deferred spawn of {} failed: {e}", class.name());
                None
            }
        }
    }

    /// Complete an actor from [`acquire_deferred`](Self::acquire_deferred).
    ///
    /// Actors of an unpooled class are activated directly.
    pub fn finalize_spawn(&self, actor: ActorHandle, transform: &Transform) -> bool {
        let Some(class) = self.world.class_of(actor) else {
            log::warn!("Finalize rejected: {}", PoolError::InvalidObject);
            return false;
        };
        if let Some(pool) = self.get_pool(&class) {
            return pool.finalize_deferred(actor, transform);
        }
        match reset::activate(&self.world, actor, transform) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Finalize of unpooled {actor} failed: {e}");
                false
            }
        }
    }

    /// Return `actor` to its class pool.
    ///
    /// Actors of an unpooled class are destroyed and false is returned.
    pub fn return_to_pool(&self, actor: ActorHandle) -> bool {
        self.counters.return_calls.fetch_add(1, Ordering::Relaxed);

        let Some(class) = self.world.class_of(actor) else {
            log::warn!("Return rejected: {}", PoolError::InvalidObject);
            return false;
        };
        match self.get_pool(&class) {
            Some(pool) => pool.release(actor),
            None => {
                log::warn!("{} has no pool, destroying {actor}", class.name());
                self.world.destroy(actor);
                false
            }
        }
    }

    // ========================================================================
    // Preallocation and ticking
    // ========================================================================

    /// Attach a preallocator to the pool of `class`, creating the pool if needed
    pub fn attach_preallocator(&self, class: &ActorClass, config: PreallocConfig) -> bool {
        self.get_or_create_pool(class)
            .is_some_and(|pool| pool.attach_preallocator(config))
    }

    /// Advance pending prewarm and every preallocator by `delta_seconds`
    pub fn tick(&self, delta_seconds: f32) {
        let due: Vec<(Arc<ActorPool>, usize)> = self.pending_prewarm.lock().drain(..).collect();
        let mut still_pending = Vec::new();
        for (pool, remaining) in due {
            let batch = remaining.min(PREWARM_BATCH);
            let made = pool.prewarm(batch);
            // A short batch means the pool is full or refusing; stop there
            if made == batch && remaining > batch {
                still_pending.push((pool, remaining - batch));
            }
        }
        self.pending_prewarm.lock().extend(still_pending);

        for pool in self.snapshot_pools() {
            pool.tick(delta_seconds);
        }
    }

    /// Pools still owed registration prewarm
    #[must_use]
    pub fn pending_prewarm(&self) -> usize {
        self.pending_prewarm.lock().len()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Sweep tombstones from every pool. Returns the number removed.
    pub fn perform_maintenance(&self) -> usize {
        let removed: usize = self
            .snapshot_pools()
            .iter()
            .map(|pool| pool.cleanup_invalid())
            .sum();
        log::debug!("Registry maintenance removed {removed} tombstones");
        removed
    }

    /// Clear every pool, keeping the pools registered
    pub fn clear_all(&self) {
        self.pending_prewarm.lock().clear();
        for pool in self.snapshot_pools() {
            pool.clear();
        }
    }

    /// Clear and unregister the pool of `class`
    pub fn remove_pool(&self, class: &ActorClass) -> bool {
        let Some(pool) = self.pools.write().remove(class) else {
            return false;
        };
        self.pending_prewarm
            .lock()
            .retain(|(pending, _)| !Arc::ptr_eq(pending, &pool));
        pool.clear();
        true
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Registry counter snapshot
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let c = &self.counters;
        RegistryStats {
            spawn_calls: c.spawn_calls.load(Ordering::Relaxed),
            return_calls: c.return_calls.load(Ordering::Relaxed),
            pools_created: c.pools_created.load(Ordering::Relaxed),
            pool_hits: c.pool_hits.load(Ordering::Relaxed),
            fallback_spawns: c.fallback_spawns.load(Ordering::Relaxed),
        }
    }

    /// Stats of every pool, sorted by class name
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<PoolStats> = self.snapshot_pools().iter().map(|p| p.stats()).collect();
        stats.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        stats
    }

    /// Pretty JSON of the registry and pool statistics
    pub fn debug_snapshot_json(&self) -> PoolResult<String> {
        let snapshot = DebugSnapshot {
            world: self.world.name(),
            registry: self.stats(),
            pools: self.pool_stats(),
        };
        serde_json::to_string_pretty(&snapshot).map_err(|e| PoolError::Config(e.to_string()))
    }

    fn snapshot_pools(&self) -> Vec<Arc<ActorPool>> {
        self.pools.read().values().cloned().collect()
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        if let Some(sub) = self.gc.take() {
            sub.gc.unsubscribe(sub.sweep);
            sub.gc.unsubscribe(sub.roots);
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("world", &self.world.name())
            .field("pools", &self.pool_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
