//! Command latches
//!
//! A latch serializes commands whose key spans overlap. A command holds its
//! latch while it executes locally and, for writes, until replication has
//! applied it. Conflict resolution (pushing, resolving intents) always
//! happens after the latch is released.
//!
//! Guards own a handle to their manager so a latch can outlive the call that
//! took it (an intent resolution proposed without waiting keeps its latch
//! until the apply thread has applied it).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use strata_core::KeyRange;

#[derive(Debug, Default)]
struct LatchState {
    next_id: u64,
    held: HashMap<u64, KeyRange>,
}

/// Set of held key-span latches
#[derive(Debug, Default)]
pub struct LatchManager {
    state: Mutex<LatchState>,
    released: Condvar,
}

/// A held latch; released on drop
#[derive(Debug)]
pub struct LatchGuard {
    manager: Arc<LatchManager>,
    id: u64,
}

impl LatchManager {
    /// Create an empty latch set
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until no held latch overlaps `span`, then hold `span`
    pub fn acquire(self: &Arc<Self>, span: KeyRange) -> LatchGuard {
        let mut state = self.state.lock();
        while state.held.values().any(|held| held.overlaps(&span)) {
            self.released.wait(&mut state);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.held.insert(id, span);
        LatchGuard {
            manager: Arc::clone(self),
            id,
        }
    }

    /// Number of latches currently held
    pub fn held(&self) -> usize {
        self.state.lock().held.len()
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        let mut state = self.manager.state.lock();
        state.held.remove(&self.id);
        drop(state);
        self.manager.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use strata_core::Key;

    fn span(a: &str, b: &str) -> KeyRange {
        KeyRange::new(Key::from(a), Key::from(b))
    }

    #[test]
    fn test_disjoint_spans_do_not_block() {
        let latches = LatchManager::new();
        let _a = latches.acquire(span("a", "c"));
        let _b = latches.acquire(span("c", "e"));
        assert_eq!(latches.held(), 2);
    }

    #[test]
    fn test_release_on_drop() {
        let latches = LatchManager::new();
        {
            let _a = latches.acquire(span("a", "c"));
            assert_eq!(latches.held(), 1);
        }
        assert_eq!(latches.held(), 0);
    }

    #[test]
    fn test_guard_moves_across_threads() {
        let latches = LatchManager::new();
        let guard = latches.acquire(span("a", "b"));
        thread::spawn(move || drop(guard)).join().unwrap();
        assert_eq!(latches.held(), 0);
    }

    #[test]
    fn test_overlapping_span_waits() {
        let latches = LatchManager::new();
        let acquired = Arc::new(AtomicBool::new(false));
        let guard = latches.acquire(span("a", "c"));

        let waiter = {
            let latches = latches.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let _g = latches.acquire(span("b", "d"));
                acquired.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
