//! Simulation-thread task queue
//!
//! Work that must run on the simulation thread (asynchronous lifecycle
//! delivery, deferred callbacks) is queued here from any thread and executed
//! when the owner calls [`World::pump`](super::World::pump).
//!
//! # Design Principles
//!
//! - **Double Buffering**: tasks queued while pumping run on the next pump
//! - **No Lock During Execution**: the queue is swapped out before tasks run,
//!   so a task may freely queue more work

use std::collections::VecDeque;

use super::World;

/// A unit of work executed on the simulation thread
pub type SimulationTask = Box<dyn FnOnce(&World) + Send>;

/// Double-buffered queue of simulation tasks.
pub struct TaskQueue {
    /// Tasks queued since the last pump
    pending: VecDeque<SimulationTask>,
    /// Tasks taken by the pump in progress
    processing: VecDeque<SimulationTask>,
}

impl TaskQueue {
    /// Default initial capacity for task queues.
    const DEFAULT_CAPACITY: usize = 64;

    /// Create a new task queue with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: VecDeque::with_capacity(Self::DEFAULT_CAPACITY),
            processing: VecDeque::with_capacity(Self::DEFAULT_CAPACITY),
        }
    }

    /// Queue a task for the next pump.
    #[inline]
    pub fn push(&mut self, task: SimulationTask) {
        self.pending.push_back(task);
    }

    /// Move pending tasks into the processing buffer and hand them out.
    ///
    /// The processing buffer is left empty so its allocation can be reused.
    pub fn take_batch(&mut self) -> VecDeque<SimulationTask> {
        std::mem::swap(&mut self.pending, &mut self.processing);
        std::mem::take(&mut self.processing)
    }

    /// Number of tasks waiting for the next pump.
    #[must_use]
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop all queued tasks.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.processing.clear();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending.len())
            .finish()
    }
}
