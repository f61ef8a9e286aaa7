//! Hybrid logical clock
//!
//! Combines a physical clock with a logical counter so that every reading is
//! unique and never regresses, and so that timestamps received from other
//! nodes are folded into later readings (causality is preserved across
//! messages).
//!
//! The physical source is pluggable: [`SystemClock`] for production,
//! [`ManualClock`] for tests that need to move time explicitly.

use crate::error::{StrataError, StrataResult};
use crate::timestamp::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Source of physical time, in nanoseconds
pub trait PhysicalClock: Send + Sync {
    /// Current physical time in nanoseconds
    fn now_nanos(&self) -> i64;
}

/// Wall clock backed by `SystemTime`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests
///
/// Clones share the same underlying value.
#[derive(Debug, Default, Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    /// Create a manual clock at `nanos`
    pub fn new(nanos: i64) -> Self {
        ManualClock(Arc::new(AtomicI64::new(nanos)))
    }

    /// Set the current time
    pub fn set(&self, nanos: i64) {
        self.0.store(nanos, Ordering::SeqCst);
    }

    /// Advance the current time by `nanos`
    pub fn increment(&self, nanos: i64) {
        self.0.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Current value
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl PhysicalClock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.get()
    }
}

/// Hybrid logical clock
///
/// Thread-safe; share it behind an `Arc`.
pub struct HybridClock {
    physical: Arc<dyn PhysicalClock>,
    state: Mutex<Timestamp>,
    max_offset: AtomicI64,
}

impl std::fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridClock")
            .field("state", &*self.state.lock())
            .field("max_offset", &self.max_offset.load(Ordering::Relaxed))
            .finish()
    }
}

impl HybridClock {
    /// Create a clock over a physical source; max offset starts at zero
    /// (offset checking disabled)
    pub fn new(physical: Arc<dyn PhysicalClock>) -> Self {
        HybridClock {
            physical,
            state: Mutex::new(Timestamp::ZERO),
            max_offset: AtomicI64::new(0),
        }
    }

    /// Clock over the system wall clock
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Clock over a manual source
    pub fn manual(clock: &ManualClock) -> Self {
        Self::new(Arc::new(clock.clone()))
    }

    /// Configure the maximum tolerated offset between nodes
    pub fn set_max_offset(&self, offset: Duration) {
        let nanos = i64::try_from(offset.as_nanos()).unwrap_or(i64::MAX);
        self.max_offset.store(nanos, Ordering::SeqCst);
    }

    /// Maximum tolerated offset
    pub fn max_offset(&self) -> Duration {
        Duration::from_nanos(self.max_offset_nanos().max(0) as u64)
    }

    /// Maximum tolerated offset in nanoseconds
    pub fn max_offset_nanos(&self) -> i64 {
        self.max_offset.load(Ordering::SeqCst)
    }

    /// Physical time reading, nanoseconds
    pub fn physical_now(&self) -> i64 {
        self.physical.now_nanos()
    }

    /// Last issued timestamp, without advancing the clock
    pub fn timestamp(&self) -> Timestamp {
        *self.state.lock()
    }

    /// Issue a new timestamp, strictly greater than every earlier one
    pub fn now(&self) -> Timestamp {
        let physical = self.physical.now_nanos();
        let mut state = self.state.lock();
        if state.wall_time >= physical {
            *state = state.next();
        } else {
            *state = Timestamp::new(physical, 0);
        }
        *state
    }

    /// Fold a remote timestamp into the clock and return the new reading
    ///
    /// Fails with `ClockOffset`, leaving the clock untouched, when the remote
    /// wall time leads the physical clock by more than the max offset (only
    /// checked when a max offset is configured).
    pub fn update(&self, remote: Timestamp) -> StrataResult<Timestamp> {
        let physical = self.physical.now_nanos();
        let max_offset = self.max_offset_nanos();
        let mut state = self.state.lock();

        if physical > state.wall_time && physical > remote.wall_time {
            *state = Timestamp::new(physical, 0);
            return Ok(*state);
        }

        if remote.wall_time > state.wall_time {
            if max_offset > 0 && remote.wall_time.saturating_sub(physical) > max_offset {
                warn!(
                    target: "strata::clock",
                    remote = %remote,
                    physical,
                    max_offset,
                    "remote timestamp exceeds max clock offset"
                );
                return Err(StrataError::ClockOffset {
                    remote,
                    physical,
                    max_offset,
                });
            }
            *state = Timestamp::new(remote.wall_time, remote.logical.saturating_add(1));
        } else if state.wall_time > remote.wall_time {
            *state = state.next();
        } else {
            let logical = state.logical.max(remote.logical);
            *state = Timestamp::new(state.wall_time, logical.saturating_add(1));
        }
        Ok(*state)
    }
}
