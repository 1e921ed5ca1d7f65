//! Typed lifecycle dispatch with timing and capability caching
//!
//! # Design Principles
//!
//! - **No Locks Held**: the handler is cloned out of the world before it runs
//! - **Fail Soft**: handler errors are logged and reported as `false`
//! - **Latency Budget**: invocations slower than the timeout are logged but
//!   never interrupted
//! - **Capability Cache**: `Poolable::handles` is probed once per class
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = world.lifecycle();
//! dispatcher.dispatch(actor, LifecycleEvent::Activated);
//! dispatcher.dispatch_with(actor, LifecycleEvent::Created, DispatchMode::Async, DEFAULT_TIMEOUT);
//! world.pump(); // delivers the async event
//! ```

use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::event::LifecycleEvent;
use crate::error::PoolError;
use crate::scene::{ActorHandle, World};

/// Default latency budget for a single handler invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// How an event reaches its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Invoke immediately on the calling thread
    #[default]
    Sync,
    /// Queue for the next simulation-thread pump
    Async,
}

/// Aggregate dispatch statistics for a world
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleStats {
    pub created: u64,
    pub activated: u64,
    pub returned: u64,
    /// Handler returned an error or was busy
    pub failed: u64,
    /// Actor invalid or not interested in the event
    pub skipped: u64,
    pub scheduled_async: u64,
    /// Invocations over their latency budget
    pub slow: u64,
    pub total_time: Duration,
}

impl LifecycleStats {
    /// Successful deliveries across all events
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.created + self.activated + self.returned
    }

    /// Mean handler time per successful delivery
    #[must_use]
    pub fn average_time(&self) -> Duration {
        match self.delivered() {
            0 => Duration::ZERO,
            n => self.total_time / n as u32,
        }
    }
}

/// Per-world dispatch state: statistics and the capability cache
#[derive(Default)]
pub(crate) struct LifecycleState {
    stats: Mutex<LifecycleStats>,
    capabilities: RwLock<FxHashMap<u64, [bool; 3]>>,
}

impl LifecycleState {
    pub(crate) fn stats(&self) -> LifecycleStats {
        self.stats.lock().clone()
    }

    fn record(&self, f: impl FnOnce(&mut LifecycleStats)) {
        f(&mut self.stats.lock());
    }
}

/// Dispatches lifecycle events to actors of one world
#[derive(Clone, Copy)]
pub struct LifecycleDispatcher<'w> {
    world: &'w World,
}

impl<'w> LifecycleDispatcher<'w> {
    #[must_use]
    pub fn new(world: &'w World) -> Self {
        Self { world }
    }

    /// Deliver `event` synchronously with the default latency budget
    pub fn dispatch(&self, actor: ActorHandle, event: LifecycleEvent) -> bool {
        self.dispatch_with(actor, event, DispatchMode::Sync, DEFAULT_TIMEOUT)
    }

    /// Deliver `event` to `actor`.
    ///
    /// Returns false when the actor is invalid, lacks a handler for the
    /// event, or the handler failed. Async dispatch returns true once queued;
    /// the actor's validity is checked again at delivery.
    pub fn dispatch_with(
        &self,
        actor: ActorHandle,
        event: LifecycleEvent,
        mode: DispatchMode,
        timeout: Duration,
    ) -> bool {
        if !event.is_dispatchable() {
            log::warn!("{event} cannot be dispatched to handlers");
            return false;
        }
        if !self.world.is_valid(actor) || !self.has_event(actor, event) {
            self.world.lifecycle_state().record(|s| s.skipped += 1);
            return false;
        }

        match mode {
            DispatchMode::Sync => deliver(self.world, actor, event, timeout),
            DispatchMode::Async => {
                self.world
                    .lifecycle_state()
                    .record(|s| s.scheduled_async += 1);
                self.world.invoke_on_simulation_thread(move |world| {
                    deliver(world, actor, event, timeout);
                });
                true
            }
        }
    }

    /// Deliver `event` to every actor. Returns the number of successes.
    pub fn batch_dispatch(
        &self,
        actors: &[ActorHandle],
        event: LifecycleEvent,
        mode: DispatchMode,
    ) -> usize {
        actors
            .iter()
            .filter(|&&actor| self.dispatch_with(actor, event, mode, DEFAULT_TIMEOUT))
            .count()
    }

    /// Whether the actor's handler wants `event`
    #[must_use]
    pub fn has_event(&self, actor: ActorHandle, event: LifecycleEvent) -> bool {
        let Some(index) = event.index() else {
            return false;
        };
        let Some(class) = self.world.class_of(actor) else {
            return false;
        };

        let state = self.world.lifecycle_state();
        if let Some(caps) = state.capabilities.read().get(&class.id()) {
            return caps[index];
        }

        let caps = match self.world.handler_slot(actor) {
            None => [false; 3],
            Some(slot) => match slot.0.try_lock() {
                Some(handler) => LifecycleEvent::DISPATCHABLE.map(|e| handler.handles(e)),
                // Busy handler; answer without caching
                None => return true,
            },
        };
        state.capabilities.write().insert(class.id(), caps);
        caps[index]
    }
}

fn deliver(world: &World, actor: ActorHandle, event: LifecycleEvent, timeout: Duration) -> bool {
    let state = world.lifecycle_state();
    if !world.is_valid(actor) {
        log::debug!("Dropped {event} for {actor}: actor no longer valid");
        state.record(|s| s.skipped += 1);
        return false;
    }
    let Some(slot) = world.handler_slot(actor) else {
        state.record(|s| s.skipped += 1);
        return false;
    };
    let Some(mut handler) = slot.0.try_lock() else {
        log::warn!(
            "{}",
            PoolError::Contention(format!("{event} re-entered the handler of {actor}"))
        );
        state.record(|s| s.failed += 1);
        return false;
    };

    let start = Instant::now();
    let result = event.invoke(&mut **handler, actor);
    drop(handler);
    let elapsed = start.elapsed();

    if elapsed > timeout {
        log::warn!("{event} handler on {actor} took {elapsed:?}, over its {timeout:?} budget");
        state.record(|s| s.slow += 1);
    }

    match result {
        Some(Ok(())) => {
            state.record(|s| {
                s.total_time += elapsed;
                match event {
                    LifecycleEvent::Created => s.created += 1,
                    LifecycleEvent::Activated => s.activated += 1,
                    LifecycleEvent::ReturnedToPool => s.returned += 1,
                    LifecycleEvent::Destroyed => {}
                }
            });
            true
        }
        Some(Err(e)) => {
            log::warn!(
                "{}",
                PoolError::HandlerFailed(format!("{event} on {actor}: {e}"))
            );
            state.record(|s| s.failed += 1);
            false
        }
        None => false,
    }
}
