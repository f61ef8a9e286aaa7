//! Push-transaction decision
//!
//! When an operation runs into another transaction's live intent, the
//! requester ("pusher") asks the intent owner's record ("pushee") to get
//! out of the way. The pusher either aborts the pushee, moves its timestamp
//! past the requester's, or fails.
//!
//! The decision is a pure function of the stored record and the request, so
//! the caller owns reading and persisting the record.

use std::time::Duration;

use strata_core::{IsolationLevel, StrataError, StrataResult, Timestamp, Transaction, TransactionStatus};
use tracing::{debug, warn};

/// Parameters of a push request
#[derive(Debug, Clone)]
pub struct PushRequest<'a> {
    /// The requester's transaction, if it runs in one
    pub pusher: Option<&'a Transaction>,
    /// Effective priority of the requester
    pub pusher_priority: i32,
    /// Timestamp of the conflicting request
    pub request_ts: Timestamp,
    /// True when the pushee must be aborted (write/write conflicts);
    /// false when moving its timestamp is enough (reads)
    pub abort: bool,
    /// Inactivity after which a pending transaction counts as abandoned
    pub expiration: Duration,
}

/// Outcome of a successful push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Updated record of the pushee, to be persisted by the caller
    pub pushee: Transaction,
    /// True when the record changed
    pub changed: bool,
}

fn is_expired(txn: &Transaction, now: Timestamp, expiration: Duration) -> bool {
    let last_active = txn.last_heartbeat.unwrap_or(txn.orig_timestamp);
    last_active.add_duration(expiration) < now
}

/// Decide a push of `pushee` given its stored record (if any)
///
/// # Errors
///
/// - `InvalidArgument` if a transaction tries to push itself
/// - `TransactionPush` if the pusher loses
pub fn push_txn(stored: Option<Transaction>, pushee: &Transaction, req: &PushRequest<'_>) -> StrataResult<PushOutcome> {
    if let Some(pusher) = req.pusher {
        if pusher.id == pushee.id {
            return Err(StrataError::invalid_argument(format!(
                "transaction {} cannot push itself",
                pusher.id
            )));
        }
    }

    let mut record = match stored {
        Some(mut record) => {
            if record.epoch < pushee.epoch {
                record.epoch = pushee.epoch;
            }
            record.upgrade_priority(pushee.priority);
            if record.is_pending() {
                record.timestamp.forward(pushee.timestamp);
            }
            record
        }
        None => pushee.clone(),
    };

    if record.status != TransactionStatus::Pending {
        debug!(target: "strata::mvcc", pushee = %record.id, status = %record.status, "pushee already finalized");
        return Ok(PushOutcome {
            pushee: record,
            changed: false,
        });
    }

    if !req.abort && record.timestamp > req.request_ts {
        return Ok(PushOutcome {
            pushee: record,
            changed: false,
        });
    }

    let expired = is_expired(&record, req.request_ts, req.expiration);
    let snapshot_read = record.isolation == IsolationLevel::Snapshot && !req.abort;
    let outranked = record.priority < req.pusher_priority;

    if !(expired || snapshot_read || outranked) {
        warn!(
            target: "strata::mvcc",
            pushee = %record.id,
            pushee_priority = record.priority,
            pusher_priority = req.pusher_priority,
            abort = req.abort,
            "push failed"
        );
        return Err(StrataError::TransactionPush {
            txn: req.pusher.map(|t| Box::new(t.clone())),
            pushee: Box::new(record),
        });
    }

    record.upgrade_priority(req.pusher_priority.saturating_sub(1));
    if req.abort {
        record.status = TransactionStatus::Aborted;
    } else {
        record.timestamp.forward(req.request_ts.next());
    }
    debug!(
        target: "strata::mvcc",
        pushee = %record.id,
        status = %record.status,
        ts = %record.timestamp,
        expired,
        "push succeeded"
    );
    Ok(PushOutcome {
        pushee: record,
        changed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Key;

    fn txn(name: &str, priority: i32, isolation: IsolationLevel, ts: Timestamp) -> Transaction {
        Transaction::new(name, Key::from(name), -priority, isolation, ts, 0)
    }

    fn request(pusher: Option<&Transaction>, priority: i32, ts: Timestamp, abort: bool) -> PushRequest<'_> {
        PushRequest {
            pusher,
            pusher_priority: priority,
            request_ts: ts,
            abort,
            expiration: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_higher_priority_aborts() {
        let pushee = txn("a", 1, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let pusher = txn("b", 2, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let out = push_txn(None, &pushee, &request(Some(&pusher), 2, Timestamp::new(1, 0), true)).unwrap();
        assert!(out.changed);
        assert_eq!(out.pushee.status, TransactionStatus::Aborted);
        assert_eq!(out.pushee.priority, 1);
    }

    #[test]
    fn test_higher_priority_read_pushes_timestamp() {
        let pushee = txn("a", 1, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let read_ts = Timestamp::new(5, 3);
        let out = push_txn(None, &pushee, &request(None, 9, read_ts, false)).unwrap();
        assert_eq!(out.pushee.status, TransactionStatus::Pending);
        assert_eq!(out.pushee.timestamp, Timestamp::new(5, 4));
        assert_eq!(out.pushee.priority, 8);
    }

    #[test]
    fn test_equal_priority_favours_pushee() {
        let pushee = txn("a", 5, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let pusher = txn("b", 5, IsolationLevel::Serializable, Timestamp::new(1, 0));
        match push_txn(None, &pushee, &request(Some(&pusher), 5, Timestamp::new(1, 0), true)).unwrap_err() {
            StrataError::TransactionPush { txn, pushee: p } => {
                assert_eq!(txn.unwrap().id, pusher.id);
                assert_eq!(p.id, pushee.id);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_pushee_always_pushable_by_reads() {
        let pushee = txn("a", 10, IsolationLevel::Snapshot, Timestamp::new(1, 0));
        let out = push_txn(None, &pushee, &request(None, 1, Timestamp::new(2, 0), false)).unwrap();
        assert_eq!(out.pushee.status, TransactionStatus::Pending);
        assert_eq!(out.pushee.timestamp, Timestamp::new(2, 1));
        // A write still cannot abort it
        assert!(push_txn(None, &pushee, &request(None, 1, Timestamp::new(2, 0), true)).is_err());
    }

    #[test]
    fn test_already_ahead_of_reader_is_noop() {
        let pushee = txn("a", 10, IsolationLevel::Serializable, Timestamp::new(9, 0));
        let out = push_txn(None, &pushee, &request(None, 1, Timestamp::new(2, 0), false)).unwrap();
        assert!(!out.changed);
        assert_eq!(out.pushee, pushee);
    }

    #[test]
    fn test_finalized_record_returned() {
        let pushee = txn("a", 10, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let mut stored = pushee.clone();
        stored.status = TransactionStatus::Committed;
        let out = push_txn(Some(stored), &pushee, &request(None, 1, Timestamp::new(2, 0), true)).unwrap();
        assert!(!out.changed);
        assert_eq!(out.pushee.status, TransactionStatus::Committed);
    }

    #[test]
    fn test_stored_record_merged_with_pushee() {
        let mut pushee = txn("a", 3, IsolationLevel::Serializable, Timestamp::new(1, 0));
        let stored = pushee.clone();
        pushee.epoch = 2;
        pushee.priority = 7;
        pushee.timestamp = Timestamp::new(4, 0);
        let out = push_txn(Some(stored), &pushee, &request(None, 100, Timestamp::new(5, 0), false)).unwrap();
        assert_eq!(out.pushee.epoch, 2);
        assert_eq!(out.pushee.priority, 99);
        assert_eq!(out.pushee.timestamp, Timestamp::new(5, 1));
    }

    #[test]
    fn test_expired_pushee_loses_regardless_of_priority() {
        let pushee = txn("a", 100, IsolationLevel::Serializable, Timestamp::new(0, 0));
        let late = Timestamp::new(Duration::from_secs(11).as_nanos() as i64, 0);
        let out = push_txn(None, &pushee, &request(None, 1, late, true)).unwrap();
        assert_eq!(out.pushee.status, TransactionStatus::Aborted);

        let mut alive = pushee.clone();
        alive.last_heartbeat = Some(Timestamp::new(Duration::from_secs(5).as_nanos() as i64, 0));
        assert!(push_txn(None, &alive, &request(None, 1, late, true)).is_err());
    }

    #[test]
    fn test_self_push_rejected() {
        let t = txn("a", 1, IsolationLevel::Serializable, Timestamp::new(1, 0));
        assert!(matches!(
            push_txn(None, &t, &request(Some(&t), 2, Timestamp::new(1, 0), true)),
            Err(StrataError::InvalidArgument { .. })
        ));
    }
}
