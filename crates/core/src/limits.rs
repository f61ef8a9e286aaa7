//! Key size limits and request key validation
//!
//! Every request passes through [`Limits::verify_keys`] before touching
//! storage. Violations are validation errors.

use crate::error::{StrataError, StrataResult};
use crate::types::Key;
use serde::{Deserialize, Serialize};

/// Default maximum key length in bytes
pub const DEFAULT_MAX_KEY_BYTES: usize = 4096;

/// Size limits for keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum key length in bytes (default: 4096)
    pub max_key_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
        }
    }
}

impl Limits {
    /// Small limits for unit tests
    pub fn with_small_limits() -> Self {
        Limits { max_key_bytes: 16 }
    }

    /// The largest addressable key: `max_key_bytes` bytes of `0xff`
    ///
    /// No request may start at this key; it is the exclusive upper bound of
    /// the keyspace.
    pub fn key_max(&self) -> Key {
        Key::new(vec![0xff; self.max_key_bytes])
    }

    /// Validate the key span of a request
    ///
    /// # Errors
    ///
    /// - `KeyTooLong` if either key exceeds `max_key_bytes`
    /// - `InvalidRange` if `start` equals [`key_max`](Self::key_max) or `end`
    ///   sorts before `start`
    pub fn verify_keys(&self, start: &Key, end: Option<&Key>) -> StrataResult<()> {
        if start.len() > self.max_key_bytes {
            return Err(StrataError::KeyTooLong {
                which: "start",
                len: start.len(),
                max: self.max_key_bytes,
            });
        }
        let key_max = self.key_max();
        if *start == key_max {
            return Err(StrataError::InvalidRange {
                start: start.clone(),
                end: end.cloned().unwrap_or_default(),
                reason: "start key must be less than the maximum key".to_string(),
            });
        }
        let end = match end {
            Some(end) if !end.is_empty() => end,
            _ => return Ok(()),
        };
        if end.len() > self.max_key_bytes {
            return Err(StrataError::KeyTooLong {
                which: "end",
                len: end.len(),
                max: self.max_key_bytes,
            });
        }
        if end < start {
            return Err(StrataError::InvalidRange {
                start: start.clone(),
                end: end.clone(),
                reason: "end key cannot sort before start key".to_string(),
            });
        }
        Ok(())
    }
}
