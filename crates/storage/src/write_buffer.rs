//! WriteBuffer: staged mutations over an engine
//!
//! Puts, deletes and merges are collected in key order and applied to the
//! wrapped engine in one atomic batch on [`WriteBuffer::commit`]. Reads see
//! the staged state layered over the engine:
//!
//! - staged delete: not found
//! - staged put: the staged value
//! - staged merge: the engine's current value merged with the staged operand
//! - nothing staged: the engine's value
//!
//! A buffer is committed at most once. Committing again, or staging after
//! commit, is a contract violation.
//!
//! The buffer is meant for a single caller at a time. It still implements
//! [`Engine`] (so code written against the engine contract can run on top
//! of it), which is why its state sits behind a mutex.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::engine::{key_bounds, BatchOp, Capacity, Engine, IterFn};
use crate::error::{StorageError, StorageResult};

const ENGINE_NAME: &str = "write buffer";

/// A staged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Set the value
    Put(Vec<u8>),
    /// Remove the key
    Delete,
    /// Merge an operand into whatever the engine holds at commit time
    Merge(Vec<u8>),
}

impl PendingWrite {
    fn into_batch_op(self, key: Vec<u8>) -> BatchOp {
        match self {
            PendingWrite::Put(value) => BatchOp::Put { key, value },
            PendingWrite::Delete => BatchOp::Delete { key },
            PendingWrite::Merge(value) => BatchOp::Merge { key, value },
        }
    }
}

/// Staging overlay over an [`Engine`]
pub struct WriteBuffer {
    engine: Arc<dyn Engine>,
    pending: Mutex<BTreeMap<Vec<u8>, PendingWrite>>,
    committed: AtomicBool,
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("pending", &self.pending.lock().len())
            .field("committed", &self.is_committed())
            .finish()
    }
}

impl WriteBuffer {
    /// Wrap an engine
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        WriteBuffer {
            engine,
            pending: Mutex::new(BTreeMap::new()),
            committed: AtomicBool::new(false),
        }
    }

    /// A fresh buffer over the same engine
    pub fn new_buffer(&self) -> WriteBuffer {
        WriteBuffer::new(Arc::clone(&self.engine))
    }

    /// Number of staged entries
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// True once `commit` has run
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    /// Apply every staged entry to the engine as one batch
    ///
    /// # Errors
    ///
    /// `ContractViolation` if the buffer was already committed; otherwise
    /// whatever the engine's `write_batch` returns.
    pub fn commit(&self) -> StorageResult<()> {
        if self.committed.swap(true, Ordering::SeqCst) {
            error!(target: "strata::storage", "write buffer committed twice");
            return Err(StorageError::ContractViolation {
                reason: "write buffer was already committed".to_string(),
            });
        }
        let pending = std::mem::take(&mut *self.pending.lock());
        let ops: Vec<BatchOp> = pending
            .into_iter()
            .map(|(key, write)| write.into_batch_op(key))
            .collect();
        if ops.is_empty() {
            return Ok(());
        }
        self.engine.write_batch(ops)
    }

    fn check_writable(&self, key: &[u8]) -> StorageResult<()> {
        if self.is_committed() {
            error!(target: "strata::storage", "mutation of committed write buffer");
            return Err(StorageError::ContractViolation {
                reason: "write buffer already committed".to_string(),
            });
        }
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        Ok(())
    }

    fn unsupported<T>(operation: &'static str) -> StorageResult<T> {
        Err(StorageError::Unsupported {
            engine: ENGINE_NAME,
            operation,
        })
    }

    /// Resolve a staged entry against the engine's value at the same key
    fn overlay(&self, staged: &PendingWrite, base: Option<&[u8]>) -> StorageResult<Option<Vec<u8>>> {
        match staged {
            PendingWrite::Delete => Ok(None),
            PendingWrite::Put(v) => Ok(Some(v.clone())),
            PendingWrite::Merge(operand) => self.engine.merge_values(base, operand).map(Some),
        }
    }
}

impl Engine for WriteBuffer {
    fn start(&self) -> StorageResult<()> {
        Self::unsupported("start")
    }

    fn stop(&self) {}

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        let staged = self.pending.lock().get(key).cloned();
        match staged {
            None => self.engine.get(key),
            Some(PendingWrite::Merge(operand)) => {
                let base = self.engine.get(key)?;
                self.engine.merge_values(base.as_deref(), &operand).map(Some)
            }
            Some(other) => self.overlay(&other, None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.check_writable(key)?;
        self.pending
            .lock()
            .insert(key.to_vec(), PendingWrite::Put(value.to_vec()));
        Ok(())
    }

    fn clear(&self, key: &[u8]) -> StorageResult<()> {
        self.check_writable(key)?;
        self.pending.lock().insert(key.to_vec(), PendingWrite::Delete);
        Ok(())
    }

    fn merge(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.check_writable(key)?;
        let mut pending = self.pending.lock();
        let next = match pending.get(key) {
            None => PendingWrite::Merge(value.to_vec()),
            Some(PendingWrite::Delete) => PendingWrite::Put(self.engine.merge_values(None, value)?),
            Some(PendingWrite::Put(existing)) => {
                PendingWrite::Put(self.engine.merge_values(Some(existing), value)?)
            }
            Some(PendingWrite::Merge(existing)) => {
                PendingWrite::Merge(self.engine.merge_values(Some(existing), value)?)
            }
        };
        pending.insert(key.to_vec(), next);
        Ok(())
    }

    fn iterate(&self, start: &[u8], end: &[u8], f: &mut IterFn<'_>) -> StorageResult<()> {
        let Some(bounds) = key_bounds(start, end) else {
            return Ok(());
        };
        let staged: Vec<(Vec<u8>, PendingWrite)> = self
            .pending
            .lock()
            .range::<[u8], _>(bounds)
            .map(|(k, w)| (k.clone(), w.clone()))
            .collect();
        let mut staged = staged.into_iter().peekable();
        let mut stopped = false;

        self.engine.iterate(start, end, &mut |key, value| {
            // Staged keys sorting before this engine key exist only in the buffer
            while let Some((k, _)) = staged.peek() {
                if k.as_slice() >= key {
                    break;
                }
                if let Some((k, w)) = staged.next() {
                    if let Some(v) = self.overlay(&w, None)? {
                        if f(&k, &v)? {
                            stopped = true;
                            return Ok(true);
                        }
                    }
                }
            }
            let out = match staged.peek() {
                Some((k, _)) if k.as_slice() == key => match staged.next() {
                    Some((_, w)) => self.overlay(&w, Some(value))?,
                    None => Some(value.to_vec()),
                },
                _ => Some(value.to_vec()),
            };
            if let Some(v) = out {
                if f(key, &v)? {
                    stopped = true;
                    return Ok(true);
                }
            }
            Ok(false)
        })?;

        if stopped {
            return Ok(());
        }
        for (k, w) in staged {
            if let Some(v) = self.overlay(&w, None)? {
                if f(&k, &v)? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn write_batch(&self, _ops: Vec<BatchOp>) -> StorageResult<()> {
        Self::unsupported("write_batch")
    }

    fn merge_values(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>> {
        self.engine.merge_values(existing, operand)
    }

    fn capacity(&self) -> StorageResult<Capacity> {
        Self::unsupported("capacity")
    }

    fn create_snapshot(&self, _id: &str) -> StorageResult<()> {
        Self::unsupported("create_snapshot")
    }

    fn release_snapshot(&self, _id: &str) -> StorageResult<()> {
        Self::unsupported("release_snapshot")
    }

    fn get_snapshot(&self, _key: &[u8], _id: &str) -> StorageResult<Option<Vec<u8>>> {
        Self::unsupported("get_snapshot")
    }

    fn iterate_snapshot(&self, _start: &[u8], _end: &[u8], _id: &str, _f: &mut IterFn<'_>) -> StorageResult<()> {
        Self::unsupported("iterate_snapshot")
    }

    fn approximate_size(&self, _start: &[u8], _end: &[u8]) -> StorageResult<u64> {
        Self::unsupported("approximate_size")
    }
}
