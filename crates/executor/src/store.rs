//! Store: the command executor
//!
//! A store owns a set of ranges over one engine and is the single entry
//! point every key-value command flows through:
//!
//! 1. route to the range named in the header and check the key span
//! 2. validate keys against [`Limits`](strata_core::Limits)
//! 3. stamp or observe the timestamp on the hybrid clock
//! 4. execute under a command latch (reads directly, writes through
//!    replication), then resolve conflicts in a bounded retry loop
//!
//! # Conflict handling
//!
//! | Error | Action |
//! |-------|--------|
//! | `WriteTooOld` | move the timestamp past the existing write, retry at once |
//! | `WriteIntent` | push the owner; on success resolve the intent, retry at once |
//! | push failed, transactional write | return the push error |
//! | push failed, otherwise | back off and retry |
//!
//! Exhausting the attempts returns `TransactionRetry` to transactional
//! callers and the last error to everyone else.
//!
//! # Thread Lifecycle
//!
//! Each store runs one apply thread that drains committed commands from
//! replication. It is stopped by [`Store::stop`] or on drop.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use strata_concurrency::get_txn_record;
use strata_core::{
    retry_with_backoff, HybridClock, Key, KeyRange, RangeId, RetryStatus, StrataError, StrataResult, Transaction,
    TxnId,
};
use strata_storage::Engine;
use tracing::{debug, trace, warn};

use crate::command::{Method, Request, Response, ResponseBody, Sender};
use crate::config::StoreConfig;
use crate::latch::{LatchGuard, LatchManager};
use crate::range::{Range, RangeDescriptor};
use crate::replication::{CommandId, ReplicatedCommand, Replication};

/// Result of applying one write command
type ApplyResult = StrataResult<(ResponseBody, Option<Transaction>)>;

/// How long the apply thread waits for a committed command per iteration
const APPLY_TICK: Duration = Duration::from_millis(20);

/// Number of applied command ids remembered for de-duplication
const APPLIED_HISTORY: usize = 4096;

struct PendingCommand {
    cmd: ReplicatedCommand,
    proposed_at: Instant,
    /// Caller waiting for the result, if any
    reply: Option<mpsc::Sender<ApplyResult>>,
    /// Latch held until the command is applied
    _latch: Option<LatchGuard>,
}

#[derive(Default)]
struct AppliedLog {
    order: VecDeque<CommandId>,
    ids: HashSet<CommandId>,
}

impl AppliedLog {
    /// Record `id`; false if it was already applied
    fn insert(&mut self, id: CommandId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > APPLIED_HISTORY {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }
}

struct StoreInner {
    store_id: u64,
    clock: Arc<HybridClock>,
    engine: Arc<dyn Engine>,
    config: StoreConfig,
    ranges: RwLock<BTreeMap<RangeId, Arc<Range>>>,
    replication: Arc<dyn Replication>,
    latches: Arc<LatchManager>,
    pending: Mutex<HashMap<CommandId, PendingCommand>>,
    applied: Mutex<AppliedLog>,
    next_seq: AtomicU64,
    stopped: AtomicBool,
}

/// A store serving ranges over one engine
///
/// # Example
///
/// ```ignore
/// use strata_executor::{NoopReplication, RangeDescriptor, Request, Store, StoreConfig};
///
/// let store = Store::new(1, clock, engine, Arc::new(NoopReplication::default()), StoreConfig::default())?;
/// store.add_range(RangeDescriptor::new(RangeId(1), Key::MIN, Limits::default().key_max()))?;
/// let resp = store.execute_cmd(Request::put("a", "value").with_range(RangeId(1)));
/// ```
pub struct Store {
    inner: Arc<StoreInner>,
    applier: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("store_id", &self.inner.store_id)
            .field("ranges", &self.inner.ranges.read().len())
            .finish()
    }
}

impl Store {
    /// Create a store and start its apply thread
    ///
    /// The clock's maximum offset is set from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the apply thread cannot be spawned.
    pub fn new(
        store_id: u64,
        clock: Arc<HybridClock>,
        engine: Arc<dyn Engine>,
        replication: Arc<dyn Replication>,
        config: StoreConfig,
    ) -> StrataResult<Store> {
        clock.set_max_offset(config.max_offset());
        engine.start()?;
        let inner = Arc::new(StoreInner {
            store_id,
            clock,
            engine,
            config,
            ranges: RwLock::new(BTreeMap::new()),
            replication,
            latches: LatchManager::new(),
            pending: Mutex::new(HashMap::new()),
            applied: Mutex::new(AppliedLog::default()),
            next_seq: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("strata-apply-{}", store_id))
            .spawn(move || worker.apply_loop())
            .map_err(|e| StrataError::internal(format!("failed to spawn apply thread: {}", e)))?;
        debug!(target: "strata::store", store_id, "store started");
        Ok(Store {
            inner,
            applier: Mutex::new(Some(handle)),
        })
    }

    /// Store id
    pub fn id(&self) -> u64 {
        self.inner.store_id
    }

    /// The store's clock
    pub fn clock(&self) -> &Arc<HybridClock> {
        &self.inner.clock
    }

    /// The store's engine
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.inner.engine
    }

    /// The store's configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Serve a new range
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the id is taken or the span overlaps a served range.
    pub fn add_range(&self, desc: RangeDescriptor) -> StrataResult<Arc<Range>> {
        let mut ranges = self.inner.ranges.write();
        if ranges.contains_key(&desc.range_id) {
            return Err(StrataError::invalid_argument(format!("range {} already exists", desc.range_id)));
        }
        if let Some(existing) = ranges.values().find(|r| r.desc().overlaps(&desc)) {
            return Err(StrataError::invalid_argument(format!(
                "range {} overlaps {}",
                desc,
                existing.desc()
            )));
        }
        let range = Arc::new(Range::new(
            desc.clone(),
            Arc::clone(&self.inner.engine),
            self.inner.config.txn_expiration(),
        ));
        ranges.insert(desc.range_id, Arc::clone(&range));
        debug!(target: "strata::store", range = %desc, "range added");
        Ok(range)
    }

    /// Stop serving a range
    pub fn remove_range(&self, range_id: RangeId) -> StrataResult<()> {
        match self.inner.ranges.write().remove(&range_id) {
            Some(_) => Ok(()),
            None => Err(StrataError::RangeNotFound { range_id }),
        }
    }

    /// Range by id
    pub fn get_range(&self, range_id: RangeId) -> StrataResult<Arc<Range>> {
        self.inner.get_range(range_id)
    }

    /// Range containing `key`, if served here
    pub fn lookup_range(&self, key: &Key) -> Option<Arc<Range>> {
        self.inner.lookup_range(key)
    }

    /// Descriptors of all served ranges, in id order
    pub fn ranges(&self) -> Vec<RangeDescriptor> {
        self.inner.ranges.read().values().map(|r| r.desc().clone()).collect()
    }

    /// The stored record of a transaction, if any
    pub fn transaction_record(&self, id: &TxnId) -> StrataResult<Option<Transaction>> {
        get_txn_record(self.inner.engine.as_ref(), id)
    }

    /// Execute one command
    pub fn execute_cmd(&self, req: Request) -> Response {
        self.inner.execute_cmd(req)
    }

    /// Stop the apply thread and fail pending commands
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.replication.stop();
        self.inner.pending.lock().clear();
        if let Some(handle) = self.applier.lock().take() {
            if handle.join().is_err() {
                warn!(target: "strata::store", store_id = self.inner.store_id, "apply thread panicked");
            }
        }
        self.inner.engine.stop();
        debug!(target: "strata::store", store_id = self.inner.store_id, "store stopped");
    }

    /// True once [`stop`](Self::stop) was called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Sender for Store {
    fn send(&self, req: Request) -> Response {
        self.execute_cmd(req)
    }
}

impl StoreInner {
    fn get_range(&self, range_id: RangeId) -> StrataResult<Arc<Range>> {
        self.ranges
            .read()
            .get(&range_id)
            .cloned()
            .ok_or(StrataError::RangeNotFound { range_id })
    }

    fn lookup_range(&self, key: &Key) -> Option<Arc<Range>> {
        self.ranges.read().values().find(|r| r.desc().contains_key(key)).cloned()
    }

    fn execute_cmd(&self, mut req: Request) -> Response {
        let method = req.method();
        let result = self.execute(&mut req);
        let txn = req.header.txn;
        match result {
            Ok((body, record)) => Response::ok(req.header.timestamp, record.or(txn), body),
            Err(err) => {
                trace!(target: "strata::store", method = %method, error = %err, "command failed");
                Response::err(req.header.timestamp, txn, err)
            }
        }
    }

    fn execute(&self, req: &mut Request) -> ApplyResult {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(StrataError::internal("store stopped"));
        }
        let range = self.get_range(req.header.range_id)?;
        // An open-ended scan stops at the end of its range.
        if req.method() == Method::Scan && req.header.end_key.is_empty() {
            req.header.end_key = range.desc().end_key.clone();
        }
        if !range.desc().contains_span(&req.header.key, req.header.end()) {
            return Err(StrataError::RangeKeyMismatch {
                start: req.header.key.clone(),
                end: req.header.end_key.clone(),
                range_id: Some(range.id()),
            });
        }
        self.config.limits.verify_keys(&req.header.key, req.header.end())?;
        if req.header.timestamp.is_zero() {
            req.header.timestamp = self.clock.now();
        } else {
            self.clock.update(req.header.timestamp)?;
        }

        let method = req.method();
        let transactional = req.header.txn.is_some();
        let mut last: ApplyResult = Err(StrataError::internal("command was not attempted"));
        let outcome = retry_with_backoff(&self.config.retry, |attempt| {
            let result = self.execute_once(&range, req);
            let status = match &result {
                Ok(_) => RetryStatus::Break,
                Err(StrataError::WriteTooOld { existing, .. }) => {
                    let ts = existing.next();
                    req.header.timestamp.forward(ts);
                    if let Some(txn) = req.header.txn.as_mut() {
                        txn.timestamp.forward(ts);
                    }
                    RetryStatus::Reset
                }
                Err(StrataError::WriteIntent { key, txn: owner, .. }) => match self.push_intent_owner(req, owner) {
                    Ok(pushee) => {
                        self.resolve_intent_async(key, &pushee);
                        RetryStatus::Reset
                    }
                    Err(push_err) if method.is_write() && transactional => {
                        last = Err(push_err);
                        return RetryStatus::Break;
                    }
                    Err(push_err) => {
                        debug!(target: "strata::store", attempt, error = %push_err, "push failed, backing off");
                        RetryStatus::Continue
                    }
                },
                Err(_) => RetryStatus::Break,
            };
            last = result;
            status
        });

        match (outcome, last) {
            (Err(exceeded), Err(err)) => match &req.header.txn {
                Some(txn) => Err(StrataError::retry(
                    txn,
                    format!("{} not resolved after {} attempts: {}", method, exceeded.attempts, err),
                )),
                None => Err(err),
            },
            (_, last) => last,
        }
    }

    fn execute_once(&self, range: &Range, req: &Request) -> ApplyResult {
        let latch = self.latches.acquire(req.header.span());
        if req.method().is_read() {
            return range.read(req).map(|body| (body, None));
        }
        let rx = self.propose(range.id(), req.clone(), None);
        let result = rx
            .recv()
            .unwrap_or_else(|_| Err(StrataError::internal("store stopped before command was applied")));
        drop(latch);
        result
    }

    fn next_command_id(&self) -> CommandId {
        CommandId {
            origin: self.store_id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Propose a write; the returned receiver yields its result once applied
    fn propose(&self, range_id: RangeId, request: Request, latch: Option<LatchGuard>) -> mpsc::Receiver<ApplyResult> {
        let (tx, rx) = mpsc::channel();
        let cmd = ReplicatedCommand {
            id: self.next_command_id(),
            range_id,
            request,
        };
        self.pending.lock().insert(
            cmd.id,
            PendingCommand {
                cmd: cmd.clone(),
                proposed_at: Instant::now(),
                reply: Some(tx),
                _latch: latch,
            },
        );
        self.replication.propose(cmd);
        rx
    }

    /// Push the owner of a conflicting intent; returns the updated record
    fn push_intent_owner(&self, req: &Request, owner: &Transaction) -> StrataResult<Transaction> {
        let range = self.lookup_range(&owner.key).ok_or_else(|| StrataError::RangeKeyMismatch {
            start: owner.key.clone(),
            end: Key::MIN,
            range_id: None,
        })?;
        let abort = req.method().is_write();
        let mut push = Request::push_txn(owner, abort)
            .with_timestamp(req.header.timestamp)
            .with_user_priority(req.header.user_priority)
            .with_range(range.id());
        push.header.txn = req.header.txn.clone();

        match self.execute_cmd(push).into_result()? {
            ResponseBody::PushTxn { pushee } => Ok(pushee),
            other => Err(StrataError::internal(format!("unexpected push response {:?}", other))),
        }
    }

    /// Propose resolution of `txn`'s intent on `key` without waiting
    ///
    /// The latch on `key` stays held until the resolution is applied, so a
    /// retried command cannot observe the intent again.
    fn resolve_intent_async(&self, key: &Key, txn: &Transaction) {
        let Some(range) = self.lookup_range(key) else {
            warn!(target: "strata::store", key = %key, "no local range to resolve intent");
            return;
        };
        let req = Request::resolve_intent(txn, &KeyRange::point(key.clone()))
            .with_timestamp(self.clock.now())
            .with_range(range.id());
        let latch = self.latches.acquire(req.header.span());
        // Dropping the receiver marks the command as having no waiter.
        drop(self.propose(range.id(), req, Some(latch)));
    }

    fn apply_loop(&self) {
        while !self.stopped.load(Ordering::SeqCst) {
            if let Some(cmd) = self.replication.next_committed(APPLY_TICK) {
                self.apply_committed(cmd);
            }
            self.repropose_stale();
        }
    }

    fn apply_committed(&self, cmd: ReplicatedCommand) {
        if !self.applied.lock().insert(cmd.id) {
            trace!(target: "strata::raft", id = %cmd.id, "duplicate command skipped");
            return;
        }
        let result = self.get_range(cmd.range_id).and_then(|range| range.apply(&cmd.request));
        let pending = self.pending.lock().remove(&cmd.id);
        let waiter = pending.and_then(|p| p.reply);
        match waiter {
            Some(tx) => {
                if let Err(mpsc::SendError(result)) = tx.send(result) {
                    log_unwaited(&cmd, &result);
                }
            }
            None => log_unwaited(&cmd, &result),
        }
    }

    fn repropose_stale(&self) {
        let timeout = self.config.proposal_timeout();
        let mut stale = Vec::new();
        {
            let mut pending = self.pending.lock();
            for entry in pending.values_mut() {
                if entry.proposed_at.elapsed() >= timeout {
                    entry.proposed_at = Instant::now();
                    stale.push(entry.cmd.clone());
                }
            }
        }
        for cmd in stale {
            warn!(target: "strata::raft", id = %cmd.id, range = %cmd.range_id, "proposal not applied in time, re-proposing");
            self.replication.propose(cmd);
        }
    }
}

fn log_unwaited(cmd: &ReplicatedCommand, result: &ApplyResult) {
    match result {
        Ok(_) => debug!(target: "strata::raft", id = %cmd.id, method = %cmd.request.method(), "applied"),
        Err(err) => warn!(target: "strata::raft", id = %cmd.id, method = %cmd.request.method(), error = %err, "apply failed"),
    }
}
