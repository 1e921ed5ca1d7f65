//! Garbage collector driving unreachable-actor reclamation
//!
//! Collection runs in three phases:
//!
//! 1. **Pre-collect hooks**: subscribers (pools) sweep their own tombstones
//! 2. **Root gathering**: reference reporters name the actors they keep alive
//! 3. **Reclamation**: every actor flagged unreachable and not rooted is destroyed
//!
//! Hooks are cloned out of the subscription table before they run, so a hook
//! may unsubscribe (or drop the last reference to its owner) mid-collection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::handle::ActorHandle;
use super::world::World;

type PreCollectHook = Arc<dyn Fn() + Send + Sync>;
type ReferenceReporter = Arc<dyn Fn(&mut Vec<ActorHandle>) + Send + Sync>;

/// Subscription id returned by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHookId(u64);

/// Mark-and-reclaim collector for a [`World`]
#[derive(Default)]
pub struct GarbageCollector {
    next_id: AtomicU64,
    pre_collect: RwLock<FxHashMap<u64, PreCollectHook>>,
    reporters: RwLock<FxHashMap<u64, ReferenceReporter>>,
    collections: AtomicU64,
}

impl GarbageCollector {
    /// Create a collector with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` at the start of every collection
    pub fn subscribe_pre_collect(&self, hook: impl Fn() + Send + Sync + 'static) -> GcHookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pre_collect.write().insert(id, Arc::new(hook));
        GcHookId(id)
    }

    /// Report extra roots at every collection
    pub fn add_reference_reporter(
        &self,
        reporter: impl Fn(&mut Vec<ActorHandle>) + Send + Sync + 'static,
    ) -> GcHookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.reporters.write().insert(id, Arc::new(reporter));
        GcHookId(id)
    }

    /// Remove a hook or reporter. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: GcHookId) -> bool {
        self.pre_collect.write().remove(&id.0).is_some()
            || self.reporters.write().remove(&id.0).is_some()
    }

    /// Number of live pre-collect subscriptions
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.pre_collect.read().len()
    }

    /// Number of completed collections
    #[must_use]
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::Relaxed)
    }

    /// Run a full collection over `world`. Returns the number of actors reclaimed.
    pub fn collect(&self, world: &World) -> usize {
        let hooks: Vec<PreCollectHook> = self.pre_collect.read().values().cloned().collect();
        for hook in &hooks {
            hook();
        }

        let reporters: Vec<ReferenceReporter> = self.reporters.read().values().cloned().collect();
        let mut reported = Vec::new();
        for reporter in &reporters {
            reporter(&mut reported);
        }
        let roots: FxHashSet<ActorHandle> = reported.into_iter().collect();

        let reclaimed = world.reclaim_unreachable(&roots);
        self.collections.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "GC pass over '{}': {} hooks, {} roots, {reclaimed} reclaimed",
            world.name(),
            hooks.len(),
            roots.len()
        );
        reclaimed
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("hooks", &self.hook_count())
            .field("collections", &self.collections())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ClassBuilder, Transform};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_collect_reclaims_unreachable_unless_rooted() {
        let world = World::new("Test");
        let gc = GarbageCollector::new();
        let class = ClassBuilder::new("Debris").build();

        let doomed = world.spawn(&class, &Transform::IDENTITY).expect("spawn");
        let rooted = world.spawn(&class, &Transform::IDENTITY).expect("spawn");
        let alive = world.spawn(&class, &Transform::IDENTITY).expect("spawn");
        world.mark_unreachable(doomed);
        world.mark_unreachable(rooted);

        gc.add_reference_reporter(move |roots| roots.push(rooted));

        assert_eq!(gc.collect(&world), 1);
        assert!(!world.is_valid(doomed));
        assert!(world.is_valid(rooted));
        assert!(world.is_valid(alive));
    }

    #[test]
    fn test_pre_collect_hooks_run_and_unsubscribe() {
        let world = World::new("Test");
        let gc = GarbageCollector::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let id = gc.subscribe_pre_collect(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        gc.collect(&world);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        assert!(gc.unsubscribe(id));
        assert!(!gc.unsubscribe(id), "Second unsubscribe is a no-op");
        gc.collect(&world);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(gc.collections(), 2);
    }
}
