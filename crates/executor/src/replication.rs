//! Replication interface
//!
//! Writes are not applied by the caller that issued them. They are proposed
//! to a replication log and applied by the store's apply thread once the
//! log hands them back as committed. The store makes no assumption about
//! which proposal a committed command answers beyond its [`CommandId`]:
//! commands may arrive more than once, from other nodes, or never.
//!
//! [`NoopReplication`] is the single-node log: proposals are committed
//! immediately, in order, through a bounded in-memory queue.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use strata_core::RangeId;
use tracing::warn;

use crate::command::Request;

/// Identity of a proposed command; re-proposals keep the same id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId {
    /// Proposing node (or store)
    pub origin: u64,
    /// Per-origin sequence number
    pub seq: u64,
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.origin, self.seq)
    }
}

/// A write command as it travels through replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedCommand {
    /// Command identity
    pub id: CommandId,
    /// Range the command applies to
    pub range_id: RangeId,
    /// The write request, with its final timestamp
    pub request: Request,
}

/// Ordering service consumed by the store
pub trait Replication: Send + Sync {
    /// Submit a command; no delivery guarantee
    fn propose(&self, cmd: ReplicatedCommand);

    /// Wait up to `timeout` for the next committed command
    fn next_committed(&self, timeout: Duration) -> Option<ReplicatedCommand>;

    /// Wake any waiter and refuse further proposals
    fn stop(&self);
}

/// Default queue bound of [`NoopReplication`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct QueueState {
    commands: VecDeque<ReplicatedCommand>,
    stopped: bool,
}

/// Local loop-back replication
#[derive(Debug)]
pub struct NoopReplication {
    state: Mutex<QueueState>,
    committed: Condvar,
    capacity: usize,
}

impl Default for NoopReplication {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl NoopReplication {
    /// Create a log holding at most `capacity` unapplied commands
    ///
    /// Proposals beyond that are dropped; the proposer re-proposes after its
    /// proposal timeout.
    pub fn new(capacity: usize) -> Self {
        NoopReplication {
            state: Mutex::new(QueueState::default()),
            committed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of committed commands not yet taken
    pub fn pending(&self) -> usize {
        self.state.lock().commands.len()
    }
}

impl Replication for NoopReplication {
    fn propose(&self, cmd: ReplicatedCommand) {
        let mut state = self.state.lock();
        if state.stopped {
            warn!(target: "strata::raft", id = %cmd.id, "proposal after stop dropped");
            return;
        }
        if state.commands.len() >= self.capacity {
            warn!(target: "strata::raft", id = %cmd.id, capacity = self.capacity, "queue full, proposal lost");
            return;
        }
        state.commands.push_back(cmd);
        drop(state);
        self.committed.notify_one();
    }

    fn next_committed(&self, timeout: Duration) -> Option<ReplicatedCommand> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(cmd) = state.commands.pop_front() {
                return Some(cmd);
            }
            if state.stopped {
                return None;
            }
            if self.committed.wait_until(&mut state, deadline).timed_out() {
                return state.commands.pop_front();
            }
        }
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.committed.notify_all();
    }
}
