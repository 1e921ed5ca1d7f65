//! Scene world hosting pooled actors
//!
//! Wraps a `hecs::World` behind a mutex so actors can be spawned, mutated and
//! destroyed from any thread. Every operation takes the lock for the duration
//! of a single component access; user code (construction scripts, lifecycle
//! handlers, queued tasks) always runs with the lock released.
//!
//! # Actor lifecycle
//!
//! | State          | Entered by                 | Valid? |
//! |----------------|----------------------------|--------|
//! | Deferred       | `spawn_deferred`           | yes    |
//! | Constructed    | `finish_construction`      | yes    |
//! | Pending kill   | `mark_pending_kill`        | no     |
//! | Gone           | `destroy` / GC reclamation | no     |

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hecs::{Component, Entity, EntityBuilder};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::class::ActorClass;
use super::components::{
    ActorState, HandlerSlot, Name, RootPrimitive, SpawnParams, SpawnValue, Transform, Velocity,
};
use super::handle::ActorHandle;
use super::invoker::TaskQueue;
use crate::error::{PoolError, PoolResult};
use crate::lifecycle::{LifecycleDispatcher, LifecycleState, LifecycleStats};

/// Global counter for generating unique world IDs
static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Point-in-time view of a single actor, for debugging and tests
#[derive(Debug, Clone, Serialize)]
pub struct ActorSnapshot {
    pub name: String,
    pub class_name: String,
    pub transform: Transform,
    pub visible: bool,
    pub tick_enabled: bool,
    pub collision_enabled: Option<bool>,
    pub velocity: Option<Velocity>,
    pub initialized: bool,
    pub pending_kill: bool,
    pub construction_runs: u32,
}

/// The scene: actor storage, class registry and simulation-thread invoker.
pub struct World {
    id: u64,
    name: String,
    entities: Mutex<hecs::World>,
    classes: RwLock<FxHashMap<String, ActorClass>>,
    tasks: Mutex<TaskQueue>,
    lifecycle: LifecycleState,
    tearing_down: AtomicBool,
    spawn_serial: AtomicU64,
    started: Instant,
}

impl World {
    /// Create an empty world
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entities: Mutex::new(hecs::World::new()),
            classes: RwLock::new(FxHashMap::default()),
            tasks: Mutex::new(TaskQueue::new()),
            lifecycle: LifecycleState::default(),
            tearing_down: AtomicBool::new(false),
            spawn_serial: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Unique world id
    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// World name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time since the world was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    // ========================================================================
    // Class registry
    // ========================================================================

    /// Make a class discoverable by name (used by configuration loading)
    pub fn register_class(&self, class: &ActorClass) {
        self.classes
            .write()
            .insert(class.name().to_string(), class.clone());
    }

    /// Look up a registered class by name
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<ActorClass> {
        self.classes.read().get(name).cloned()
    }

    // ========================================================================
    // Spawning and destruction
    // ========================================================================

    /// Spawn an actor without running its construction script.
    ///
    /// The actor is hidden, not ticking and has collision disabled until
    /// [`finish_construction`](Self::finish_construction) runs.
    pub fn spawn_deferred(
        &self,
        class: &ActorClass,
        transform: &Transform,
    ) -> PoolResult<ActorHandle> {
        if self.is_tearing_down() {
            return Err(PoolError::ConstructionFailed(format!(
                "world '{}' is tearing down",
                self.name
            )));
        }
        if class.is_abstract() {
            return Err(PoolError::ConstructionFailed(format!(
                "class {} is abstract",
                class.name()
            )));
        }

        // Handler factories are user code; run them before taking the lock
        let handler = class.create_handler();
        let serial = self.spawn_serial.fetch_add(1, Ordering::Relaxed);

        let mut builder = EntityBuilder::new();
        builder
            .add(Name::new(format!("{}_{serial}", class.name())))
            .add(*transform)
            .add(ActorState::deferred(class.clone()))
            .add(SpawnParams::default());
        if class.has_root_primitive() {
            builder.add(RootPrimitive::default());
        }
        if let Some(handler) = handler {
            builder.add(HandlerSlot::new(handler));
        }

        let entity = self.entities.lock().spawn(builder.build());
        let handle = ActorHandle::from_entity(entity);
        log::trace!("Spawned deferred {} as {handle}", class.name());
        Ok(handle)
    }

    /// Spawn and fully construct an actor with its class defaults applied
    pub fn spawn(&self, class: &ActorClass, transform: &Transform) -> PoolResult<ActorHandle> {
        let handle = self.spawn_deferred(class, transform)?;
        if let Err(e) = self.finish_construction(handle, transform) {
            self.destroy(handle);
            return Err(e);
        }
        self.set_visible(handle, true);
        self.set_tick_enabled(handle, class.tick_by_default());
        self.set_collision_enabled(handle, class.collision_by_default());
        Ok(handle)
    }

    /// Destroy an actor immediately. Returns false for stale handles.
    pub fn destroy(&self, handle: ActorHandle) -> bool {
        let destroyed = self.entities.lock().despawn(handle.entity()).is_ok();
        if destroyed {
            log::trace!("Destroyed {handle}");
        }
        destroyed
    }

    /// Flag an actor for destruction; it fails validity checks from now on
    pub fn mark_pending_kill(&self, handle: ActorHandle) -> bool {
        self.write::<ActorState, _>(handle, |s| s.pending_kill = true)
            .is_some()
    }

    /// Flag an actor as unreachable so the next collection reclaims it
    pub fn mark_unreachable(&self, handle: ActorHandle) -> bool {
        self.write::<ActorState, _>(handle, |s| s.unreachable = true)
            .is_some()
    }

    /// Refuse further construction and activation
    pub fn begin_teardown(&self) {
        if !self.tearing_down.swap(true, Ordering::AcqRel) {
            log::info!("World '{}' is tearing down", self.name);
        }
    }

    /// Whether the world is shutting down
    #[must_use]
    #[inline]
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }

    /// Reclaim every unreachable actor not present in `roots`.
    pub(crate) fn reclaim_unreachable(&self, roots: &FxHashSet<ActorHandle>) -> usize {
        let mut entities = self.entities.lock();
        let doomed: Vec<Entity> = entities
            .query::<&ActorState>()
            .iter()
            .filter(|(entity, state)| {
                state.unreachable && !roots.contains(&ActorHandle::from_entity(*entity))
            })
            .map(|(entity, _)| entity)
            .collect();

        for entity in &doomed {
            let _ = entities.despawn(*entity);
        }
        doomed.len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether the handle refers to a live actor not pending kill
    #[must_use]
    pub fn is_valid(&self, handle: ActorHandle) -> bool {
        self.read::<ActorState, _>(handle, |s| !s.pending_kill)
            .unwrap_or(false)
    }

    /// Whether the actor still exists, regardless of pending kill
    #[must_use]
    pub fn exists(&self, handle: ActorHandle) -> bool {
        self.entities.lock().contains(handle.entity())
    }

    /// Class of a live actor
    #[must_use]
    pub fn class_of(&self, handle: ActorHandle) -> Option<ActorClass> {
        self.read::<ActorState, _>(handle, |s| s.class.clone())
    }

    /// Whether the actor is still awaiting `finish_construction`
    #[must_use]
    pub fn is_deferred(&self, handle: ActorHandle) -> Option<bool> {
        self.read::<ActorState, _>(handle, |s| !s.initialized)
    }

    /// Current transform of an actor
    #[must_use]
    pub fn transform_of(&self, handle: ActorHandle) -> Option<Transform> {
        self.read::<Transform, _>(handle, |t| *t)
    }

    /// Spawn parameters of an actor
    #[must_use]
    pub fn spawn_params(&self, handle: ActorHandle) -> Option<SpawnParams> {
        self.read::<SpawnParams, _>(handle, SpawnParams::clone)
    }

    /// Number of live actors (including pending kill)
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.entities.lock().len() as usize
    }

    /// Number of live actors of exactly `class`
    #[must_use]
    pub fn count_of(&self, class: &ActorClass) -> usize {
        self.entities
            .lock()
            .query::<&ActorState>()
            .iter()
            .filter(|(_, state)| &state.class == class)
            .count()
    }

    /// Handles of every live actor of exactly `class`, in handle order
    #[must_use]
    pub fn actors_of(&self, class: &ActorClass) -> Vec<ActorHandle> {
        let mut actors: Vec<ActorHandle> = self
            .entities
            .lock()
            .query::<&ActorState>()
            .iter()
            .filter(|(_, state)| &state.class == class)
            .map(|(entity, _)| ActorHandle::from_entity(entity))
            .collect();
        actors.sort_unstable();
        actors
    }

    /// Capture the observable state of an actor
    #[must_use]
    pub fn snapshot(&self, handle: ActorHandle) -> Option<ActorSnapshot> {
        let entities = self.entities.lock();
        let entity = entities.entity(handle.entity()).ok()?;
        let state = entity.get::<&ActorState>()?;
        let transform = entity.get::<&Transform>().map(|t| *t).unwrap_or_default();
        let name = entity
            .get::<&Name>()
            .map(|n| n.0.clone())
            .unwrap_or_default();
        let primitive = entity.get::<&RootPrimitive>().map(|p| *p);

        Some(ActorSnapshot {
            name,
            class_name: state.class.name().to_string(),
            transform,
            visible: state.visible,
            tick_enabled: state.tick_enabled,
            collision_enabled: primitive.map(|p| p.collision_enabled),
            velocity: primitive.map(|p| p.velocity),
            initialized: state.initialized,
            pending_kill: state.pending_kill,
            construction_runs: state.construction_runs,
        })
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Show or hide an actor
    pub fn set_visible(&self, handle: ActorHandle, visible: bool) -> bool {
        self.write::<ActorState, _>(handle, |s| s.visible = visible)
            .is_some()
    }

    /// Enable or disable per-frame updates
    pub fn set_tick_enabled(&self, handle: ActorHandle, enabled: bool) -> bool {
        self.write::<ActorState, _>(handle, |s| s.tick_enabled = enabled)
            .is_some()
    }

    /// Enable or disable collision. Returns false for actors without a root primitive.
    pub fn set_collision_enabled(&self, handle: ActorHandle, enabled: bool) -> bool {
        self.write::<RootPrimitive, _>(handle, |p| p.collision_enabled = enabled)
            .is_some()
    }

    /// Move an actor
    pub fn set_transform(&self, handle: ActorHandle, transform: &Transform) -> bool {
        self.write::<Transform, _>(handle, |t| *t = *transform)
            .is_some()
    }

    /// Set the root primitive's velocity
    pub fn set_velocity(&self, handle: ActorHandle, velocity: Velocity) -> bool {
        self.write::<RootPrimitive, _>(handle, |p| {
            p.velocity = velocity;
            p.simulate_physics = true;
        })
        .is_some()
    }

    /// Zero linear and angular velocity. Returns false for actors without a root primitive.
    pub fn clear_velocities(&self, handle: ActorHandle) -> bool {
        self.write::<RootPrimitive, _>(handle, |p| p.velocity = Velocity::default())
            .is_some()
    }

    /// Set a spawn parameter read by the construction script
    pub fn set_spawn_param(
        &self,
        handle: ActorHandle,
        key: impl Into<String>,
        value: SpawnValue,
    ) -> bool {
        let key = key.into();
        self.write::<SpawnParams, _>(handle, |p| {
            p.set(key, value);
        })
        .is_some()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Complete construction of a deferred actor and run its construction script
    pub fn finish_construction(&self, handle: ActorHandle, transform: &Transform) -> PoolResult<()> {
        if self.is_tearing_down() {
            return Err(PoolError::ActivationFailed(format!(
                "world '{}' is tearing down",
                self.name
            )));
        }

        let was_deferred = self
            .write::<ActorState, _>(handle, |s| !std::mem::replace(&mut s.initialized, true))
            .ok_or(PoolError::InvalidObject)?;
        if !was_deferred {
            return Err(PoolError::ActivationFailed(format!(
                "{handle} already finished construction"
            )));
        }

        self.set_transform(handle, transform);
        self.run_construction_script(handle)
    }

    /// Re-run the construction script of an already constructed actor
    pub fn rerun_construction(&self, handle: ActorHandle) -> PoolResult<()> {
        if !self.is_valid(handle) {
            return Err(PoolError::InvalidObject);
        }
        if self.is_tearing_down() {
            return Err(PoolError::ActivationFailed(format!(
                "world '{}' is tearing down",
                self.name
            )));
        }
        self.run_construction_script(handle)
    }

    fn run_construction_script(&self, handle: ActorHandle) -> PoolResult<()> {
        let (slot, params) = {
            let entities = self.entities.lock();
            let entity = entities
                .entity(handle.entity())
                .map_err(|_| PoolError::InvalidObject)?;
            let mut state = entity
                .get::<&mut ActorState>()
                .ok_or(PoolError::InvalidObject)?;
            state.construction_runs += 1;

            let slot = entity.get::<&HandlerSlot>().map(|s| HandlerSlot::clone(&s));
            let params = entity
                .get::<&SpawnParams>()
                .map(|p| SpawnParams::clone(&p))
                .unwrap_or_default();
            (slot, params)
        };

        if let Some(slot) = slot {
            let Some(mut handler) = slot.0.try_lock() else {
                return Err(PoolError::Contention(format!(
                    "handler of {handle} is busy during construction"
                )));
            };
            handler.construct(handle, &params);
        }
        Ok(())
    }

    // ========================================================================
    // Handlers and the simulation thread
    // ========================================================================

    pub(crate) fn handler_slot(&self, handle: ActorHandle) -> Option<HandlerSlot> {
        self.read::<HandlerSlot, _>(handle, HandlerSlot::clone)
    }

    pub(crate) fn lifecycle_state(&self) -> &LifecycleState {
        &self.lifecycle
    }

    /// Lifecycle event dispatcher bound to this world
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleDispatcher<'_> {
        LifecycleDispatcher::new(self)
    }

    /// Accumulated lifecycle dispatch statistics
    #[must_use]
    pub fn lifecycle_stats(&self) -> LifecycleStats {
        self.lifecycle.stats()
    }

    /// Queue work to run on the simulation thread at the next [`pump`](Self::pump)
    pub fn invoke_on_simulation_thread(&self, task: impl FnOnce(&World) + Send + 'static) {
        self.tasks.lock().push(Box::new(task));
    }

    /// Run every task queued before this call. Returns the number executed.
    ///
    /// Tasks queued while pumping run on the next pump.
    pub fn pump(&self) -> usize {
        let batch = self.tasks.lock().take_batch();
        let count = batch.len();
        for task in batch {
            task(self);
        }
        count
    }

    /// Number of tasks waiting for the next pump
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().pending_count()
    }

    // ------------------------------------------------------------------------
    // Component access helpers
    // ------------------------------------------------------------------------

    fn read<T: Component, R>(&self, handle: ActorHandle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let entities = self.entities.lock();
        let component = entities.get::<&T>(handle.entity()).ok()?;
        Some(f(&component))
    }

    fn write<T: Component, R>(
        &self,
        handle: ActorHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let entities = self.entities.lock();
        let mut component = entities.get::<&mut T>(handle.entity()).ok()?;
        Some(f(&mut component))
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("actors", &self.actor_count())
            .field("tearing_down", &self.is_tearing_down())
            .finish_non_exhaustive()
    }
}
