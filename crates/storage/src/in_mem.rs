//! InMemEngine: BTreeMap-backed engine
//!
//! - `BTreeMap<Vec<u8>, Vec<u8>>` under a `parking_lot::RwLock`
//! - Capacity accounting over key + value bytes
//! - Named snapshots as deep clones of the map
//! - Pluggable merge operator
//!
//! Iteration copies entries out in small chunks and runs the callback with
//! no lock held, so a callback may write back into the same engine.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::engine::{key_bounds, BatchOp, Capacity, Engine, IterFn, KeyValue};
use crate::error::{StorageError, StorageResult};
use crate::merge::{AppendMerge, MergeOperator};

/// Entries copied per lock acquisition while iterating
const ITER_CHUNK: usize = 128;

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    used: u64,
}

impl Inner {
    fn entry_size(key: &[u8], value: &[u8]) -> u64 {
        (key.len() + value.len()) as u64
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let added = Self::entry_size(&key, &value);
        if let Some(old) = self.data.insert(key.clone(), value) {
            self.used -= Self::entry_size(&key, &old);
        }
        self.used += added;
    }

    fn remove(&mut self, key: &[u8]) {
        if let Some(old) = self.data.remove(key) {
            self.used -= Self::entry_size(key, &old);
        }
    }
}

/// In-memory engine
#[derive(Debug)]
pub struct InMemEngine {
    inner: RwLock<Inner>,
    snapshots: RwLock<HashMap<String, Arc<BTreeMap<Vec<u8>, Vec<u8>>>>>,
    capacity: u64,
    merge_op: Arc<dyn MergeOperator>,
    started: AtomicBool,
}

impl Default for InMemEngine {
    fn default() -> Self {
        Self::new(u64::MAX)
    }
}

impl InMemEngine {
    /// Create an engine limited to `capacity` bytes, using byte-append merges
    pub fn new(capacity: u64) -> Self {
        Self::with_merge_operator(capacity, Arc::new(AppendMerge))
    }

    /// Create an engine with a specific merge operator
    pub fn with_merge_operator(capacity: u64, merge_op: Arc<dyn MergeOperator>) -> Self {
        InMemEngine {
            inner: RwLock::new(Inner::default()),
            snapshots: RwLock::new(HashMap::new()),
            capacity,
            merge_op,
            started: AtomicBool::new(false),
        }
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    /// True when no keys are stored
    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    /// True between `start` and `stop`
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn check_key(key: &[u8]) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        Ok(())
    }

    fn check_space(&self, inner: &Inner, requested: u64) -> StorageResult<()> {
        let available = self.capacity.saturating_sub(inner.used);
        if requested > available {
            return Err(StorageError::Full { requested, available });
        }
        Ok(())
    }

    fn snapshot(&self, id: &str) -> StorageResult<Arc<BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.snapshots
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::Snapshot {
                id: id.to_string(),
                reason: "not found".to_string(),
            })
    }

    /// Chunked iteration over a map produced by `read`
    fn iterate_chunked<F>(start: &[u8], end: &[u8], read: F, f: &mut IterFn<'_>) -> StorageResult<()>
    where
        F: Fn(Bound<&[u8]>, Bound<&[u8]>) -> Vec<KeyValue>,
    {
        let Some((_, upper)) = key_bounds(start, end) else {
            return Ok(());
        };
        let mut cursor: Vec<u8> = start.to_vec();
        let mut inclusive = true;
        loop {
            let lower = if inclusive {
                Bound::Included(cursor.as_slice())
            } else {
                Bound::Excluded(cursor.as_slice())
            };
            let chunk = read(lower, upper);
            let exhausted = chunk.len() < ITER_CHUNK;
            for (k, v) in &chunk {
                if f(k, v)? {
                    return Ok(());
                }
            }
            match chunk.into_iter().last() {
                Some((k, _)) if !exhausted => {
                    cursor = k;
                    inclusive = false;
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_chunk(map: &BTreeMap<Vec<u8>, Vec<u8>>, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> Vec<KeyValue> {
        if let (Bound::Excluded(l), Bound::Excluded(u)) = (lower, upper) {
            if l >= u {
                return Vec::new();
            }
        }
        map.range::<[u8], _>((lower, upper))
            .take(ITER_CHUNK)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Engine for InMemEngine {
    fn start(&self) -> StorageResult<()> {
        self.started.store(true, Ordering::SeqCst);
        debug!(target: "strata::storage", capacity = self.capacity, "in-memory engine started");
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Self::check_key(key)?;
        Ok(self.inner.read().data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Self::check_key(key)?;
        let mut inner = self.inner.write();
        let existing = inner.data.get(key).map(|v| Inner::entry_size(key, v)).unwrap_or(0);
        let needed = Inner::entry_size(key, value).saturating_sub(existing);
        self.check_space(&inner, needed)?;
        inner.set(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn clear(&self, key: &[u8]) -> StorageResult<()> {
        Self::check_key(key)?;
        self.inner.write().remove(key);
        Ok(())
    }

    fn merge(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Self::check_key(key)?;
        let mut inner = self.inner.write();
        let existing = inner.data.get(key);
        let merged = self.merge_op.merge(existing.map(|v| v.as_slice()), value)?;
        let old = existing.map(|v| Inner::entry_size(key, v)).unwrap_or(0);
        self.check_space(&inner, Inner::entry_size(key, &merged).saturating_sub(old))?;
        inner.set(key.to_vec(), merged);
        Ok(())
    }

    fn iterate(&self, start: &[u8], end: &[u8], f: &mut IterFn<'_>) -> StorageResult<()> {
        Self::iterate_chunked(
            start,
            end,
            |lower, upper| Self::read_chunk(&self.inner.read().data, lower, upper),
            f,
        )
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        if ops.iter().any(|op| op.key().is_empty()) {
            return Err(StorageError::EmptyKey);
        }
        let mut inner = self.inner.write();

        // Compute every final value first so a failing merge or a capacity
        // overflow leaves the engine untouched.
        let mut staged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    staged.insert(key, Some(value));
                }
                BatchOp::Delete { key } => {
                    staged.insert(key, None);
                }
                BatchOp::Merge { key, value } => {
                    let current = match staged.get(&key) {
                        Some(v) => v.clone(),
                        None => inner.data.get(&key).cloned(),
                    };
                    let merged = self.merge_op.merge(current.as_deref(), &value)?;
                    staged.insert(key, Some(merged));
                }
            }
        }

        let mut growth: i64 = 0;
        for (key, value) in &staged {
            let old = inner.data.get(key).map(|v| Inner::entry_size(key, v)).unwrap_or(0) as i64;
            let new = value.as_ref().map(|v| Inner::entry_size(key, v)).unwrap_or(0) as i64;
            growth += new - old;
        }
        if growth > 0 {
            self.check_space(&inner, growth as u64)?;
        }

        for (key, value) in staged {
            match value {
                Some(value) => inner.set(key, value),
                None => inner.remove(&key),
            }
        }
        Ok(())
    }

    fn merge_values(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>> {
        self.merge_op.merge(existing, operand)
    }

    fn capacity(&self) -> StorageResult<Capacity> {
        let used = self.inner.read().used;
        Ok(Capacity {
            capacity: self.capacity,
            available: self.capacity.saturating_sub(used),
        })
    }

    fn create_snapshot(&self, id: &str) -> StorageResult<()> {
        let mut snapshots = self.snapshots.write();
        if snapshots.contains_key(id) {
            return Err(StorageError::Snapshot {
                id: id.to_string(),
                reason: "already exists".to_string(),
            });
        }
        let copy = self.inner.read().data.clone();
        snapshots.insert(id.to_string(), Arc::new(copy));
        debug!(target: "strata::storage", snapshot = id, "snapshot created");
        Ok(())
    }

    fn release_snapshot(&self, id: &str) -> StorageResult<()> {
        match self.snapshots.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(StorageError::Snapshot {
                id: id.to_string(),
                reason: "not found".to_string(),
            }),
        }
    }

    fn get_snapshot(&self, key: &[u8], id: &str) -> StorageResult<Option<Vec<u8>>> {
        Self::check_key(key)?;
        Ok(self.snapshot(id)?.get(key).cloned())
    }

    fn iterate_snapshot(&self, start: &[u8], end: &[u8], id: &str, f: &mut IterFn<'_>) -> StorageResult<()> {
        let snap = self.snapshot(id)?;
        Self::iterate_chunked(start, end, |lower, upper| Self::read_chunk(&snap, lower, upper), f)
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> StorageResult<u64> {
        let Some(bounds) = key_bounds(start, end) else {
            return Ok(0);
        };
        let inner = self.inner.read();
        Ok(inner
            .data
            .range::<[u8], _>(bounds)
            .map(|(k, v)| Inner::entry_size(k, v))
            .sum())
    }
}
