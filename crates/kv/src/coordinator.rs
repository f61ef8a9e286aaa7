//! Transaction coordinator
//!
//! `TxnCoordSender` wraps another [`Sender`] and manages the client side of
//! every transaction that passes through it:
//!
//! - **Begin**: a request carrying a transaction with an empty id starts a
//!   new transaction anchored at the request key.
//! - **Tracking**: each request of a pending transaction records its key
//!   span (coalesced, see [`KeyRanges`]) and the time of last activity.
//! - **Heartbeat**: one background task per open transaction refreshes the
//!   server-side record every heartbeat interval.
//! - **Garbage collection**: a sweep drops local state of transactions idle
//!   longer than the client timeout. It never contacts the server.
//! - **Completion**: after `EndTransaction` (successful or not) or once the
//!   transaction is known to be aborted, local state is removed and intent
//!   resolution for every recorded span is issued in the background.
//!
//! # Error translation
//!
//! Conflict errors rewrite the transaction returned with the response, so
//! the caller can retry with it directly:
//!
//! | Error | Epoch | Priority | Timestamp |
//! |-------|-------|----------|-----------|
//! | `ReadWithinUncertaintyInterval` | +1 | unchanged | existing value's timestamp, next tick |
//! | `TransactionAborted` | unchanged | server record's | server record's |
//! | `TransactionPush` | +1 | blocker's priority - 1 | blocker's timestamp, next tick |
//! | `TransactionRetry` | +1 | server record's | server record's |
//!
//! A restart also moves the original timestamp to the new timestamp.
//! Every other error is returned untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use strata_core::{
    HybridClock, Key, KeyRange, StrataError, StrataResult, Timestamp, Transaction, TransactionStatus, TxnId,
};
use strata_executor::{Method, Request, Response, Sender};
use tracing::{debug, trace, warn};

use crate::config::CoordinatorConfig;
use crate::heartbeat::{spawn_periodic, CancelToken};
use crate::key_ranges::KeyRanges;

/// Snapshot of the coordinator's view of one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxnState {
    /// Last known transaction record
    pub txn: Transaction,
    /// Minimal set of key intervals the transaction has touched
    pub key_ranges: Vec<KeyRange>,
    /// Clock reading at the most recent request
    pub last_update: Timestamp,
}

struct TxnMetadata {
    txn: Transaction,
    keys: KeyRanges,
    last_update: Timestamp,
    heartbeat: CancelToken,
}

struct CoordInner {
    wrapped: Arc<dyn Sender>,
    clock: Arc<HybridClock>,
    config: CoordinatorConfig,
    txns: Mutex<HashMap<TxnId, TxnMetadata>>,
    closed: AtomicBool,
}

/// Client-side transaction coordinator
///
/// # Example
///
/// ```ignore
/// use strata_kv::{CoordinatorConfig, TxnCoordSender};
///
/// let coord = TxnCoordSender::new(local_sender, clock, CoordinatorConfig::default())?;
/// let begin = Transaction::unstarted("transfer", IsolationLevel::Serializable);
/// let resp = coord.send(Request::put("a", "1").with_txn(&begin));
/// let txn = resp.header.txn.clone().unwrap();
/// coord.send(Request::end_transaction(&txn, true));
/// ```
pub struct TxnCoordSender {
    inner: Arc<CoordInner>,
    gc_token: CancelToken,
    gc: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TxnCoordSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnCoordSender")
            .field("txns", &self.txn_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl TxnCoordSender {
    /// Wrap `wrapped` and start the garbage-collection sweep
    ///
    /// # Errors
    ///
    /// `Internal` if the sweep thread cannot be spawned.
    pub fn new(wrapped: Arc<dyn Sender>, clock: Arc<HybridClock>, config: CoordinatorConfig) -> StrataResult<Self> {
        let gc_interval = config.gc_interval();
        let inner = Arc::new(CoordInner {
            wrapped,
            clock,
            config,
            txns: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let gc_token = CancelToken::new();
        let sweeper = Arc::clone(&inner);
        let gc = spawn_periodic("strata-txn-gc".to_string(), gc_interval, gc_token.clone(), move || {
            sweeper.gc_sweep();
            true
        })
        .map_err(|e| StrataError::internal(format!("failed to spawn gc thread: {}", e)))?;

        Ok(TxnCoordSender {
            inner,
            gc_token,
            gc: Mutex::new(Some(gc)),
        })
    }

    /// Coordinator configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Number of transactions with local state
    pub fn txn_count(&self) -> usize {
        self.inner.txns.lock().len()
    }

    /// Local state of transaction `id`, if tracked
    pub fn txn_state(&self, id: &TxnId) -> Option<TxnState> {
        self.inner.txns.lock().get(id).map(|meta| TxnState {
            txn: meta.txn.clone(),
            key_ranges: meta.keys.to_vec(),
            last_update: meta.last_update,
        })
    }

    /// Stop the sweep and every heartbeat; local state is dropped
    ///
    /// Requests are still forwarded afterwards but no longer tracked.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gc_token.cancel();
        if let Some(handle) = self.gc.lock().take() {
            if handle.join().is_err() {
                warn!(target: "strata::txn", "gc thread panicked");
            }
        }
        let drained: Vec<TxnMetadata> = self.inner.txns.lock().drain().map(|(_, meta)| meta).collect();
        for meta in drained {
            meta.heartbeat.cancel();
        }
        debug!(target: "strata::txn", "coordinator closed");
    }
}

impl Drop for TxnCoordSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl Sender for TxnCoordSender {
    fn send(&self, req: Request) -> Response {
        self.inner.send(req)
    }
}

impl CoordInner {
    fn send(self: &Arc<Self>, mut req: Request) -> Response {
        let method = req.method();
        let begins = req.header.txn.as_ref().map_or(false, |t| t.id.is_empty());
        if begins {
            if let Some(template) = req.header.txn.take() {
                req.header.txn = Some(self.begin(&template, &req.header.key, req.header.user_priority));
            }
        }
        if req.header.txn.is_none() || method.is_internal() {
            return self.wrapped.send(req);
        }

        self.track(&mut req, method);
        let Some(sent) = req.header.txn.clone() else {
            return self.wrapped.send(req);
        };
        req.header.timestamp = sent.timestamp;

        let mut resp = self.wrapped.send(req);
        let txn = self.absorb(method, sent, &resp);
        resp.header.txn = Some(txn);
        resp
    }

    fn begin(&self, template: &Transaction, key: &Key, user_priority: i32) -> Transaction {
        let mut txn = Transaction::new(
            template.name.clone(),
            key.clone(),
            user_priority,
            template.isolation,
            self.clock.now(),
            self.clock.max_offset_nanos(),
        );
        txn.upgrade_priority(template.priority);
        debug!(target: "strata::txn", txn = %txn.id, name = %txn.name, priority = txn.priority, "transaction begun");
        txn
    }

    /// Sync the request's transaction with local state and record its span
    fn track(self: &Arc<Self>, req: &mut Request, method: Method) {
        let span = req.header.span();
        let Some(txn) = req.header.txn.as_mut() else {
            return;
        };
        let now = self.clock.now();
        let mut new_heartbeat = None;
        {
            let mut txns = self.txns.lock();
            match txns.get_mut(&txn.id) {
                Some(meta) => {
                    if meta.txn.epoch == txn.epoch {
                        txn.timestamp.forward(meta.txn.timestamp);
                    }
                    if method != Method::EndTransaction {
                        meta.keys.add(span);
                        meta.last_update.forward(now);
                    }
                }
                None if method != Method::EndTransaction && txn.is_pending() && !self.closed.load(Ordering::SeqCst) => {
                    let mut keys = KeyRanges::new();
                    keys.add(span);
                    let token = CancelToken::new();
                    txns.insert(
                        txn.id.clone(),
                        TxnMetadata {
                            txn: txn.clone(),
                            keys,
                            last_update: now,
                            heartbeat: token.clone(),
                        },
                    );
                    new_heartbeat = Some((txn.id.clone(), token));
                }
                None => {}
            }
        }
        if let Some((id, token)) = new_heartbeat {
            self.start_heartbeat(id, token);
        }
    }

    /// Fold the response into the transaction and local state
    fn absorb(&self, method: Method, sent: Transaction, resp: &Response) -> Transaction {
        let mut txn = sent;
        if let Some(server) = resp.header.txn.as_ref().filter(|t| t.id == txn.id) {
            txn.update(server);
        }
        if let Some(err) = resp.error() {
            translate_error(&mut txn, err);
        }

        if method == Method::EndTransaction || !txn.is_pending() {
            self.cleanup(&txn);
        } else if let Some(meta) = self.txns.lock().get_mut(&txn.id) {
            meta.txn.update(&txn);
        }
        txn
    }

    fn start_heartbeat(self: &Arc<Self>, id: TxnId, token: CancelToken) {
        let inner = Arc::clone(self);
        let txn_id = id.clone();
        let spawned = spawn_periodic(
            "strata-txn-heartbeat".to_string(),
            self.config.heartbeat_interval(),
            token,
            move || inner.heartbeat(&txn_id),
        );
        if let Err(e) = spawned {
            warn!(target: "strata::txn", txn = %id, error = %e, "failed to start heartbeat");
        }
    }

    /// Send one heartbeat; false once the transaction needs no more
    fn heartbeat(&self, id: &TxnId) -> bool {
        let txn = match self.txns.lock().get(id) {
            Some(meta) => meta.txn.clone(),
            None => return false,
        };
        let resp = self.wrapped.send(Request::heartbeat(&txn).with_timestamp(self.clock.now()));
        if let Some(err) = resp.error() {
            warn!(target: "strata::txn", txn = %id, error = %err, "heartbeat failed");
            return true;
        }
        let Some(record) = resp.header.txn else {
            return true;
        };
        trace!(target: "strata::txn", txn = %id, heartbeat = ?record.last_heartbeat, "heartbeat");
        if record.is_pending() {
            if let Some(meta) = self.txns.lock().get_mut(id) {
                meta.txn.update(&record);
            }
            return true;
        }
        let mut finished = txn;
        finished.update(&record);
        debug!(target: "strata::txn", txn = %id, status = %finished.status, "transaction finished elsewhere");
        self.cleanup(&finished);
        false
    }

    fn gc_sweep(&self) {
        let now = self.clock.physical_now();
        let timeout = i64::try_from(self.config.client_timeout().as_nanos()).unwrap_or(i64::MAX);
        let mut txns = self.txns.lock();
        let expired: Vec<TxnId> = txns
            .iter()
            .filter(|(_, meta)| now.saturating_sub(meta.last_update.wall_time) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(meta) = txns.remove(&id) {
                meta.heartbeat.cancel();
                debug!(target: "strata::txn", txn = %id, last_update = %meta.last_update, "abandoned transaction collected");
            }
        }
    }

    /// Drop local state and resolve recorded intents in the background
    fn cleanup(&self, txn: &Transaction) {
        let Some(meta) = self.txns.lock().remove(&txn.id) else {
            return;
        };
        meta.heartbeat.cancel();
        if meta.keys.is_empty() {
            return;
        }
        let wrapped = Arc::clone(&self.wrapped);
        let ranges = meta.keys.to_vec();
        let txn = txn.clone();
        let txn_id = txn.id.clone();
        let spawned = thread::Builder::new()
            .name("strata-txn-cleanup".to_string())
            .spawn(move || resolve_intents(wrapped.as_ref(), &txn, &ranges));
        if let Err(e) = spawned {
            warn!(target: "strata::txn", txn = %txn_id, error = %e, "failed to start intent resolution");
        }
    }
}

fn resolve_intents(sender: &dyn Sender, txn: &Transaction, ranges: &[KeyRange]) {
    for range in ranges {
        let resp = sender.send(Request::resolve_intent(txn, range));
        if let Some(err) = resp.error() {
            warn!(target: "strata::txn", txn = %txn.id, range = %range, error = %err, "failed to resolve intents");
        }
    }
    debug!(target: "strata::txn", txn = %txn.id, status = %txn.status, ranges = ranges.len(), "intents resolved");
}

/// Rewrite `txn` for the next attempt after `err`
pub(crate) fn translate_error(txn: &mut Transaction, err: &StrataError) {
    match err {
        StrataError::ReadWithinUncertaintyInterval { existing, .. } => {
            let priority = txn.priority;
            txn.restart(priority, existing.next());
        }
        StrataError::TransactionAborted { txn: record } => {
            txn.update(record);
            txn.status = TransactionStatus::Aborted;
        }
        StrataError::TransactionPush { pushee, .. } => {
            txn.restart(pushee.priority.saturating_sub(1), pushee.timestamp.next());
        }
        StrataError::TransactionRetry { txn: record, .. } => {
            txn.restart(record.priority, record.timestamp);
        }
        _ => {}
    }
}
