//! Storage error types

use strata_core::StrataError;
use thiserror::Error;

/// Result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by engines and write buffers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Keys must be non-empty
    #[error("attempted access to empty key")]
    EmptyKey,

    /// Operation not supported by this engine
    #[error("{operation} is not supported by {engine}")]
    Unsupported {
        /// Engine kind
        engine: &'static str,
        /// Operation name
        operation: &'static str,
    },

    /// Programming-contract violation (e.g. committing a write buffer twice)
    #[error("contract violation: {reason}")]
    ContractViolation {
        /// What was violated
        reason: String,
    },

    /// The merge operator rejected its inputs
    #[error("merge failed: {reason}")]
    Merge {
        /// Why
        reason: String,
    },

    /// Unknown or duplicate snapshot id
    #[error("snapshot {id}: {reason}")]
    Snapshot {
        /// Snapshot id
        id: String,
        /// Why
        reason: String,
    },

    /// Engine is out of capacity
    #[error("engine full: {requested} bytes requested, {available} available")]
    Full {
        /// Bytes the write needed
        requested: u64,
        /// Bytes left
        available: u64,
    },
}

impl StorageError {
    /// True for local misuse that must be fixed, not handled
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, StorageError::ContractViolation { .. })
    }
}

impl From<StorageError> for StrataError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::EmptyKey => StrataError::EmptyKey,
            StorageError::Unsupported { engine, operation } => StrataError::Unsupported {
                operation: format!("{} on {}", operation, engine),
            },
            StorageError::ContractViolation { reason } => StrataError::ContractViolation { reason },
            other => StrataError::Storage(other.to_string()),
        }
    }
}
