//! Ranges: contiguous key spans served by a store
//!
//! A range executes commands against the store's engine. Reads run
//! directly on the engine. Writes run inside a fresh
//! [`WriteBuffer`](strata_storage::WriteBuffer) that is committed only when
//! the command succeeds, so a failed command never leaves partial state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_concurrency::{
    get_txn_record, mvcc_delete, mvcc_get, mvcc_increment, mvcc_put, mvcc_resolve_write_intent,
    mvcc_resolve_write_intent_range, mvcc_scan, push_txn, put_txn_record, PushRequest,
};
use strata_core::{
    make_priority, IsolationLevel, Key, RangeId, StrataError, StrataResult, Transaction, TransactionStatus,
};
use strata_storage::{Engine, WriteBuffer};
use tracing::{debug, info};

use crate::command::{Request, RequestBody, ResponseBody};

/// Bounds and identity of a range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    /// Range id
    pub range_id: RangeId,
    /// Inclusive start key
    pub start_key: Key,
    /// Exclusive end key
    pub end_key: Key,
}

impl RangeDescriptor {
    /// Describe `[start_key, end_key)`
    pub fn new(range_id: RangeId, start_key: Key, end_key: Key) -> Self {
        RangeDescriptor {
            range_id,
            start_key,
            end_key,
        }
    }

    /// True when `key` lies in the range
    pub fn contains_key(&self, key: &Key) -> bool {
        key >= &self.start_key && key < &self.end_key
    }

    /// True when the span `[key, end)` (or the point `key`) lies in the range
    pub fn contains_span(&self, key: &Key, end: Option<&Key>) -> bool {
        match end {
            None => self.contains_key(key),
            Some(end) => key >= &self.start_key && end <= &self.end_key && key < &self.end_key,
        }
    }

    /// True when the two ranges share a key
    pub fn overlaps(&self, other: &RangeDescriptor) -> bool {
        self.start_key < other.end_key && other.start_key < self.end_key
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {})", self.range_id, self.start_key, self.end_key)
    }
}

/// A range replica
pub struct Range {
    desc: RangeDescriptor,
    engine: Arc<dyn Engine>,
    txn_expiration: Duration,
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range").field("desc", &self.desc).finish()
    }
}

fn require_txn(req: &Request) -> StrataResult<&Transaction> {
    req.header
        .txn
        .as_ref()
        .ok_or_else(|| StrataError::invalid_argument(format!("{} requires a transaction", req.method())))
}

impl Range {
    /// Create a range over `engine`
    pub fn new(desc: RangeDescriptor, engine: Arc<dyn Engine>, txn_expiration: Duration) -> Self {
        Range {
            desc,
            engine,
            txn_expiration,
        }
    }

    /// The range's descriptor
    pub fn desc(&self) -> &RangeDescriptor {
        &self.desc
    }

    /// Range id
    pub fn id(&self) -> RangeId {
        self.desc.range_id
    }

    /// Execute a read-only command
    pub fn read(&self, req: &Request) -> StrataResult<ResponseBody> {
        let h = &req.header;
        match &req.body {
            RequestBody::Get => Ok(ResponseBody::Get {
                value: mvcc_get(self.engine.as_ref(), &h.key, h.timestamp, h.txn.as_ref())?,
            }),
            RequestBody::Scan { max_results } => Ok(ResponseBody::Scan {
                rows: mvcc_scan(
                    self.engine.as_ref(),
                    &h.key,
                    &h.end_key,
                    *max_results,
                    h.timestamp,
                    h.txn.as_ref(),
                )?,
            }),
            _ => Err(StrataError::invalid_argument(format!("{} is not a read", req.method()))),
        }
    }

    /// Apply a write command atomically
    ///
    /// Returns the result and, for transaction-record methods, the record
    /// as stored.
    pub fn apply(&self, req: &Request) -> StrataResult<(ResponseBody, Option<Transaction>)> {
        let buffer = WriteBuffer::new(Arc::clone(&self.engine));
        let out = self.execute_write(&buffer, req)?;
        buffer.commit()?;
        Ok(out)
    }

    fn execute_write(&self, engine: &dyn Engine, req: &Request) -> StrataResult<(ResponseBody, Option<Transaction>)> {
        let h = &req.header;
        let txn = h.txn.as_ref();
        match &req.body {
            RequestBody::Put { value } => {
                mvcc_put(engine, &h.key, h.timestamp, Some(value.clone()), txn)?;
                Ok((ResponseBody::Put, None))
            }
            RequestBody::Delete => {
                mvcc_delete(engine, &h.key, h.timestamp, txn)?;
                Ok((ResponseBody::Delete, None))
            }
            RequestBody::Increment { delta } => {
                let new_value = mvcc_increment(engine, &h.key, h.timestamp, txn, *delta)?;
                Ok((ResponseBody::Increment { new_value }, None))
            }
            RequestBody::EndTransaction { commit } => self.end_transaction(engine, req, *commit),
            RequestBody::HeartbeatTxn => self.heartbeat_txn(engine, req),
            RequestBody::PushTxn { pushee, abort } => self.push_txn(engine, req, pushee, *abort),
            RequestBody::ResolveIntent => {
                let txn = require_txn(req)?;
                match h.end() {
                    None => mvcc_resolve_write_intent(engine, &h.key, txn)?,
                    Some(end) => {
                        mvcc_resolve_write_intent_range(engine, &h.key, end, 0, txn)?;
                    }
                }
                Ok((ResponseBody::ResolveIntent, None))
            }
            RequestBody::Get | RequestBody::Scan { .. } => Err(StrataError::invalid_argument(format!(
                "{} is not a write",
                req.method()
            ))),
        }
    }

    fn end_transaction(
        &self,
        engine: &dyn Engine,
        req: &Request,
        commit: bool,
    ) -> StrataResult<(ResponseBody, Option<Transaction>)> {
        let txn = require_txn(req)?;
        let mut record = get_txn_record(engine, &txn.id)?.unwrap_or_else(|| txn.clone());

        match record.status {
            TransactionStatus::Aborted => {
                return Err(StrataError::TransactionAborted { txn: Box::new(record) });
            }
            TransactionStatus::Committed => {
                return Err(StrataError::status(&record, "already committed"));
            }
            TransactionStatus::Pending => {}
        }
        if txn.epoch < record.epoch {
            return Err(StrataError::status(
                &record,
                format!("epoch regression: {} < {}", txn.epoch, record.epoch),
            ));
        }
        record.epoch = txn.epoch;
        record.timestamp.forward(txn.timestamp);

        if commit {
            if record.isolation == IsolationLevel::Serializable && record.timestamp != txn.orig_timestamp {
                return Err(StrataError::retry(
                    &record,
                    format!("timestamp pushed from {} to {}", txn.orig_timestamp, record.timestamp),
                ));
            }
            record.status = TransactionStatus::Committed;
        } else {
            record.status = TransactionStatus::Aborted;
        }
        put_txn_record(engine, &record)?;
        info!(target: "strata::txn", txn = %record.id, status = %record.status, ts = %record.timestamp, "transaction finished");
        Ok((ResponseBody::EndTransaction, Some(record)))
    }

    fn heartbeat_txn(&self, engine: &dyn Engine, req: &Request) -> StrataResult<(ResponseBody, Option<Transaction>)> {
        let txn = require_txn(req)?;
        let mut record = get_txn_record(engine, &txn.id)?.unwrap_or_else(|| txn.clone());
        if record.is_pending() {
            let hb = record.last_heartbeat.get_or_insert(req.header.timestamp);
            hb.forward(req.header.timestamp);
            put_txn_record(engine, &record)?;
            debug!(target: "strata::txn", txn = %record.id, heartbeat = %req.header.timestamp, "heartbeat");
        }
        Ok((ResponseBody::HeartbeatTxn, Some(record)))
    }

    fn push_txn(
        &self,
        engine: &dyn Engine,
        req: &Request,
        pushee: &Transaction,
        abort: bool,
    ) -> StrataResult<(ResponseBody, Option<Transaction>)> {
        let pusher = req.header.txn.as_ref();
        let pusher_priority = match pusher {
            Some(p) => p.priority,
            None => make_priority(req.header.user_priority),
        };
        let push = PushRequest {
            pusher,
            pusher_priority,
            request_ts: req.header.timestamp,
            abort,
            expiration: self.txn_expiration,
        };
        let outcome = push_txn(get_txn_record(engine, &pushee.id)?, pushee, &push)?;
        if outcome.changed {
            put_txn_record(engine, &outcome.pushee)?;
        }
        Ok((ResponseBody::PushTxn { pushee: outcome.pushee }, None))
    }
}
