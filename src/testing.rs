//! Test support: a warning-counting logger and recording lifecycle handlers

use std::cell::RefCell;
use std::sync::{Arc, Once};

use parking_lot::Mutex;

use crate::lifecycle::{HandlerError, HandlerResult, LifecycleEvent, Poolable};
use crate::scene::{ActorClass, ActorHandle, ClassBuilder, SpawnParams};

// ============================================================================
// Logging
// ============================================================================

thread_local! {
    static WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

struct CountingLogger;

impl log::Log for CountingLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        if record.level() == log::Level::Warn {
            let message = record.args().to_string();
            WARNINGS.with(|w| w.borrow_mut().push(message));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CountingLogger = CountingLogger;
static INSTALL: Once = Once::new();

/// Install the counting logger (once per process) and clear this thread's warnings
pub fn capture_warnings() {
    INSTALL.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });
    WARNINGS.with(|w| w.borrow_mut().clear());
}

/// Warnings logged on this thread since the last [`capture_warnings`]
pub fn warnings() -> Vec<String> {
    WARNINGS.with(|w| w.borrow().clone())
}

// ============================================================================
// Recording handler
// ============================================================================

#[derive(Default)]
struct LogInner {
    events: Vec<(ActorHandle, LifecycleEvent)>,
    constructions: Vec<(ActorHandle, SpawnParams)>,
}

/// Shared record of everything delivered to [`RecordingHandler`]s
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<LogInner>>,
}

impl EventLog {
    /// Events delivered to `actor`, in order
    pub fn events_for(&self, actor: ActorHandle) -> Vec<LifecycleEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|(a, _)| *a == actor)
            .map(|(_, e)| *e)
            .collect()
    }

    /// Number of `event` deliveries across all actors
    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|(_, e)| *e == event)
            .count()
    }

    /// Construction script runs for `actor`
    pub fn constructions_for(&self, actor: ActorHandle) -> usize {
        self.inner
            .lock()
            .constructions
            .iter()
            .filter(|(a, _)| *a == actor)
            .count()
    }

    /// Spawn parameters seen by the latest construction of `actor`
    pub fn last_params(&self, actor: ActorHandle) -> Option<SpawnParams> {
        self.inner
            .lock()
            .constructions
            .iter()
            .rev()
            .find(|(a, _)| *a == actor)
            .map(|(_, p)| p.clone())
    }
}

/// Handler that appends every event to an [`EventLog`]
pub struct RecordingHandler {
    log: EventLog,
    fail_on: Option<LifecycleEvent>,
}

impl RecordingHandler {
    /// Class whose actors record into `log`
    pub fn class(name: &str, log: &EventLog) -> ActorClass {
        let log = log.clone();
        ClassBuilder::new(name)
            .with_root_primitive(true)
            .with_handler(move || RecordingHandler {
                log: log.clone(),
                fail_on: None,
            })
            .build()
    }

    /// Class whose handlers fail on `event` (after recording it)
    pub fn failing_class(name: &str, log: &EventLog, event: LifecycleEvent) -> ActorClass {
        let log = log.clone();
        ClassBuilder::new(name)
            .with_root_primitive(true)
            .with_handler(move || RecordingHandler {
                log: log.clone(),
                fail_on: Some(event),
            })
            .build()
    }

    fn record(&self, actor: ActorHandle, event: LifecycleEvent) -> HandlerResult {
        self.log.inner.lock().events.push((actor, event));
        if self.fail_on == Some(event) {
            return Err(HandlerError::new(format!("{event} rejected")));
        }
        Ok(())
    }
}

impl Poolable for RecordingHandler {
    fn on_created(&mut self, actor: ActorHandle) -> HandlerResult {
        self.record(actor, LifecycleEvent::Created)
    }

    fn on_activated(&mut self, actor: ActorHandle) -> HandlerResult {
        self.record(actor, LifecycleEvent::Activated)
    }

    fn on_returned(&mut self, actor: ActorHandle) -> HandlerResult {
        self.record(actor, LifecycleEvent::ReturnedToPool)
    }

    fn construct(&mut self, actor: ActorHandle, params: &SpawnParams) {
        self.log
            .inner
            .lock()
            .constructions
            .push((actor, params.clone()));
    }
}
