//! Transaction record and priority helpers
//!
//! A `Transaction` is the unit both sides of the engine exchange: the
//! coordinator owns the client-visible copy and the store owns the durable
//! copy that conflict resolution consults. Identity (`id`, `name`, `key`,
//! `isolation`) never changes; everything else moves forward as the
//! transaction is pushed, restarted or finished.

use crate::timestamp::Timestamp;
use crate::types::{Key, TxnId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation level of a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Commit timestamp fixed at start; a push forces a retry
    #[default]
    Serializable,
    /// Commit timestamp may float forward
    Snapshot,
}

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// In flight
    #[default]
    Pending,
    /// Committed, intents become visible
    Committed,
    /// Aborted, intents are discarded
    Aborted,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Committed => write!(f, "COMMITTED"),
            TransactionStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Convert a user priority into a transaction priority
///
/// - Negative values are explicit priorities: `-p` becomes `p`.
/// - Zero is treated as one.
/// - A positive `p` draws a random priority from the top `(p-1)/p` of the
///   positive `i32` range, so larger user priorities tend to win conflicts.
pub fn make_priority(user_priority: i32) -> i32 {
    if user_priority < 0 {
        return user_priority.checked_neg().unwrap_or(i32::MAX);
    }
    let p = user_priority.max(1);
    let span = i32::MAX / p;
    i32::MAX - rand::thread_rng().gen_range(0..span)
}

/// A transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id (base key + random suffix)
    pub id: TxnId,
    /// Human-readable name for logs
    pub name: String,
    /// Key the transaction record is anchored at
    pub key: Key,
    /// Isolation level
    pub isolation: IsolationLevel,
    /// Lifecycle state
    pub status: TransactionStatus,
    /// Restart counter
    pub epoch: u32,
    /// Conflict priority; higher wins
    pub priority: i32,
    /// Proposed commit timestamp
    pub timestamp: Timestamp,
    /// Timestamp at which the current epoch started
    pub orig_timestamp: Timestamp,
    /// Upper bound of the read uncertainty window
    pub max_timestamp: Timestamp,
    /// Last heartbeat recorded by the server, if any
    pub last_heartbeat: Option<Timestamp>,
}

impl Transaction {
    /// Create a new pending transaction anchored at `key`
    ///
    /// # Arguments
    ///
    /// * `name` - label used in logs
    /// * `key` - base key; the id and record location derive from it
    /// * `user_priority` - passed through [`make_priority`]
    /// * `isolation` - isolation level
    /// * `now` - current clock reading; becomes both timestamps
    /// * `max_offset` - maximum clock offset in nanoseconds, bounds the
    ///   uncertainty window
    pub fn new(
        name: impl Into<String>,
        key: Key,
        user_priority: i32,
        isolation: IsolationLevel,
        now: Timestamp,
        max_offset: i64,
    ) -> Self {
        let id = TxnId::generate(&key);
        Transaction {
            id,
            name: name.into(),
            key,
            isolation,
            status: TransactionStatus::Pending,
            epoch: 0,
            priority: make_priority(user_priority),
            timestamp: now,
            orig_timestamp: now,
            max_timestamp: Timestamp::new(now.wall_time.saturating_add(max_offset), now.logical),
            last_heartbeat: None,
        }
    }

    /// A transaction descriptor with an empty id
    ///
    /// Sent through a coordinator it means "begin": the coordinator assigns
    /// the id, anchor key, timestamps and priority on the first request.
    /// A non-zero `priority` set on the template acts as a minimum.
    pub fn unstarted(name: impl Into<String>, isolation: IsolationLevel) -> Self {
        Transaction {
            id: TxnId::empty(),
            name: name.into(),
            key: Key::MIN,
            isolation,
            status: TransactionStatus::Pending,
            epoch: 0,
            priority: 0,
            timestamp: Timestamp::ZERO,
            orig_timestamp: Timestamp::ZERO,
            max_timestamp: Timestamp::ZERO,
            last_heartbeat: None,
        }
    }

    /// True while the transaction is neither committed nor aborted
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Raise the priority to at least `min`
    pub fn upgrade_priority(&mut self, min: i32) {
        if min > self.priority {
            self.priority = min;
        }
    }

    /// Begin a new epoch of the same transaction
    ///
    /// The epoch increments, the timestamp moves forward to `timestamp` (if
    /// later), the new epoch starts at that timestamp and the priority is
    /// raised to at least `priority`.
    pub fn restart(&mut self, priority: i32, timestamp: Timestamp) {
        self.epoch += 1;
        self.timestamp.forward(timestamp);
        self.orig_timestamp = self.timestamp;
        self.max_timestamp.forward(self.timestamp);
        self.upgrade_priority(priority);
    }

    /// Fold in another copy of the same transaction (typically the server's)
    pub fn update(&mut self, other: &Transaction) {
        if other.status != TransactionStatus::Pending {
            self.status = other.status;
        }
        if other.epoch > self.epoch {
            self.epoch = other.epoch;
            self.orig_timestamp = other.orig_timestamp;
        }
        self.timestamp.forward(other.timestamp);
        self.max_timestamp.forward(other.max_timestamp);
        self.upgrade_priority(other.priority);
        if let Some(hb) = other.last_heartbeat {
            match self.last_heartbeat.as_mut() {
                Some(mine) => {
                    mine.forward(hb);
                }
                None => self.last_heartbeat = Some(hb),
            }
        }
    }

    /// Upper bound for reads: the larger of the timestamp and `max_timestamp`
    pub fn read_upper_bound(&self) -> Timestamp {
        self.timestamp.max(self.max_timestamp)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" id={} status={} epoch={} pri={} ts={} orig={}",
            self.name, self.id, self.status, self.epoch, self.priority, self.timestamp, self.orig_timestamp
        )
    }
}
