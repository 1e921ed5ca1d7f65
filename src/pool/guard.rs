//! Same-thread re-entrancy guard for pools
//!
//! While a pool dispatches lifecycle events, its id sits on this thread's
//! stack. A handler that calls back into the same pool is refused instead of
//! deadlocking or corrupting the split-phase bookkeeping.

use std::cell::RefCell;

use smallvec::SmallVec;

thread_local! {
    static DISPATCHING: RefCell<SmallVec<[u64; 4]>> = RefCell::new(SmallVec::new());
}

/// Marks a pool as dispatching on this thread until dropped
pub(crate) struct DispatchScope {
    pool_id: u64,
}

impl DispatchScope {
    pub(crate) fn enter(pool_id: u64) -> Self {
        DISPATCHING.with(|stack| stack.borrow_mut().push(pool_id));
        Self { pool_id }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|&id| id == self.pool_id) {
                stack.remove(pos);
            }
        });
    }
}

/// Whether `pool_id` is dispatching further up this thread's stack
pub(crate) fn is_dispatching(pool_id: u64) -> bool {
    DISPATCHING.with(|stack| stack.borrow().contains(&pool_id))
}
