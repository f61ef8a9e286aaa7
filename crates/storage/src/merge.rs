//! Merge operators
//!
//! A merge folds an operand into an existing value without a read on the
//! caller's side. Engines apply their operator on `merge`; write buffers use
//! the same operator to combine staged operands.

use crate::error::{StorageError, StorageResult};

/// Combines an operand with an existing value
///
/// Implementations must be associative:
/// `merge(merge(x, a), b) == merge(x, merge(Some(a), b))`.
pub trait MergeOperator: Send + Sync + std::fmt::Debug {
    /// Fold `operand` into `existing` (None when the key is absent)
    fn merge(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>>;
}

/// Byte concatenation
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendMerge;

impl MergeOperator for AppendMerge {
    fn merge(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>> {
        let existing = existing.unwrap_or_default();
        let mut out = Vec::with_capacity(existing.len() + operand.len());
        out.extend_from_slice(existing);
        out.extend_from_slice(operand);
        Ok(out)
    }
}

/// Big-endian `i64` addition (wrapping)
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterMerge;

impl CounterMerge {
    fn decode(bytes: &[u8]) -> StorageResult<i64> {
        let arr: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Merge {
            reason: format!("counter operand must be 8 bytes, got {}", bytes.len()),
        })?;
        Ok(i64::from_be_bytes(arr))
    }
}

impl MergeOperator for CounterMerge {
    fn merge(&self, existing: Option<&[u8]>, operand: &[u8]) -> StorageResult<Vec<u8>> {
        let base = match existing {
            Some(bytes) => Self::decode(bytes)?,
            None => 0,
        };
        let delta = Self::decode(operand)?;
        Ok(base.wrapping_add(delta).to_be_bytes().to_vec())
    }
}
