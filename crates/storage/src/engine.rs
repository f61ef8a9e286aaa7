//! The key/value engine contract
//!
//! Everything above storage sees a flat, ordered byte keyspace. Keys are
//! raw (already encoded) bytes; ranges are half-open `[start, end)` and an
//! empty `end` means "to the end of the keyspace".

use std::ops::Bound;

use crate::error::StorageResult;

/// A raw key/value pair
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Callback used by iteration: return `Ok(true)` to stop early
pub type IterFn<'a> = dyn FnMut(&[u8], &[u8]) -> StorageResult<bool> + 'a;

/// One mutation in an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `key` to `value`
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove `key`
    Delete {
        /// Key
        key: Vec<u8>,
    },
    /// Merge `value` into `key` with the engine's merge operator
    Merge {
        /// Key
        key: Vec<u8>,
        /// Operand
        value: Vec<u8>,
    },
}

impl BatchOp {
    /// Key the operation targets
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } | BatchOp::Merge { key, .. } => key,
        }
    }
}

/// Space accounting reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capacity {
    /// Total bytes
    pub capacity: u64,
    /// Bytes still free
    pub available: u64,
}

/// An ordered key/value store
///
/// Implementations are shared between threads, so every method takes
/// `&self`.
pub trait Engine: Send + Sync {
    /// Start the engine
    fn start(&self) -> StorageResult<()>;

    /// Stop the engine
    fn stop(&self);

    /// Read a key
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Write a key
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove a key
    fn clear(&self, key: &[u8]) -> StorageResult<()>;

    /// Merge an operand into a key
    fn merge(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Visit `[start, end)` in key order until `f` asks to stop
    fn iterate(&self, start: &[u8], end: &[u8], f: &mut IterFn<'_>) -> StorageResult<()>;

    /// Collect up to `max` pairs from `[start, end)` (0 = unlimited)
    fn scan(&self, start: &[u8], end: &[u8], max: usize) -> StorageResult<Vec<KeyValue>> {
        let mut out = Vec::new();
        self.iterate(start, end, &mut |k, v| {
            if max != 0 && out.len() >= max {
                return Ok(true);
            }
            out.push((k.to_vec(), v.to_vec()));
            Ok(false)
        })?;
        Ok(out)
    }

    /// Apply all operations atomically
    fn write_batch(&self, ops: Vec<BatchOp>) -> StorageResult<()>;

    /// Combine an operand with an existing value using this engine's merge operator
    fn merge_values(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>>;

    /// Report space accounting
    fn capacity(&self) -> StorageResult<Capacity>;

    /// Take a named point-in-time snapshot
    fn create_snapshot(&self, id: &str) -> StorageResult<()>;

    /// Drop a named snapshot
    fn release_snapshot(&self, id: &str) -> StorageResult<()>;

    /// Read a key from a snapshot
    fn get_snapshot(&self, key: &[u8], id: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Iterate a snapshot
    fn iterate_snapshot(&self, start: &[u8], end: &[u8], id: &str, f: &mut IterFn<'_>) -> StorageResult<()>;

    /// Approximate bytes used by `[start, end)`
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> StorageResult<u64>;
}

/// Bounds for `BTreeMap<Vec<u8>, _>::range`, or `None` when the range is empty
pub(crate) fn key_bounds<'a>(start: &'a [u8], end: &'a [u8]) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
    if end.is_empty() {
        return Some((Bound::Included(start), Bound::Unbounded));
    }
    if start >= end {
        return None;
    }
    Some((Bound::Included(start), Bound::Excluded(end)))
}
