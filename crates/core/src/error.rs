//! Error types for Strata
//!
//! One error enum travels through every layer of the transaction engine.
//! Errors fall into three families:
//!
//! - **Validation**: malformed keys and ranges, unknown ranges, clock skew
//!   beyond tolerance. The single operation fails; nothing is retried and no
//!   transaction state changes.
//! - **Conflict**: write intents, stale writes, uncertainty, push failures,
//!   aborts and retries. These carry the conflicting timestamp, priority or
//!   transaction record needed to compute the next attempt.
//! - **Contract**: misuse of a local component (committing a write buffer
//!   twice, unsupported buffer operations). These are programming errors.
//!
//! `StrataError` is `Clone` because responses carry it back to callers and the
//! coordinator inspects it after the fact.

use crate::timestamp::Timestamp;
use crate::transaction::Transaction;
use crate::types::{Key, RangeId};
use thiserror::Error;

/// Result type alias used across Strata
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Errors surfaced by the transaction engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrataError {
    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------
    /// A key was required but empty
    #[error("empty key not allowed")]
    EmptyKey,

    /// Key exceeds the configured maximum length
    #[error("{which} key too long: {len} bytes exceeds maximum {max}")]
    KeyTooLong {
        /// "start" or "end"
        which: &'static str,
        /// Actual length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Malformed key range
    #[error("invalid range [{start}, {end}): {reason}")]
    InvalidRange {
        /// Start key
        start: Key,
        /// End key
        end: Key,
        /// What is wrong with it
        reason: String,
    },

    /// No range with the given id is served here
    #[error("range {range_id} not found")]
    RangeNotFound {
        /// The requested range id
        range_id: RangeId,
    },

    /// The addressed keys are not contained in the target range
    #[error("keys [{start}, {end}) outside of bounds of range {range_id:?}")]
    RangeKeyMismatch {
        /// Request start key
        start: Key,
        /// Request end key (empty for point requests)
        end: Key,
        /// Range that was asked, if any
        range_id: Option<RangeId>,
    },

    /// A remote timestamp leads the local physical clock by more than the
    /// tolerated offset
    #[error("remote wall time {remote} too far ahead of local physical clock {physical} (max offset {max_offset}ns)")]
    ClockOffset {
        /// Remote timestamp observed
        remote: Timestamp,
        /// Local physical clock reading, nanoseconds
        physical: i64,
        /// Configured max offset, nanoseconds
        max_offset: i64,
    },

    /// A request argument was missing or malformed
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description
        reason: String,
    },

    // ---------------------------------------------------------------------
    // Conflict
    // ---------------------------------------------------------------------
    /// Operation ran into another transaction's write intent
    #[error("conflicting write intent at key {key} from transaction {}", txn.id)]
    WriteIntent {
        /// Key holding the intent
        key: Key,
        /// Owner of the intent
        txn: Box<Transaction>,
        /// True if the intent was resolved and the operation may be retried at once
        resolved: bool,
    },

    /// A write arrived at or below the timestamp of the latest committed version
    #[error("write too old: timestamp {timestamp} <= {existing}")]
    WriteTooOld {
        /// Timestamp of the rejected write
        timestamp: Timestamp,
        /// Timestamp of the newer committed value
        existing: Timestamp,
    },

    /// A read found a value in its uncertainty window
    #[error("read at {timestamp} encountered value at {existing} within uncertainty interval")]
    ReadWithinUncertaintyInterval {
        /// Read timestamp
        timestamp: Timestamp,
        /// Timestamp of the uncertain value
        existing: Timestamp,
    },

    /// The transaction was aborted by a pusher
    #[error("transaction {} aborted", txn.id)]
    TransactionAborted {
        /// Server copy of the aborted transaction
        txn: Box<Transaction>,
    },

    /// Pusher could not overcome the conflicting transaction
    #[error("failed to push transaction {}", pushee.id)]
    TransactionPush {
        /// The pusher (absent for non-transactional requests)
        txn: Option<Box<Transaction>>,
        /// The transaction that could not be pushed
        pushee: Box<Transaction>,
    },

    /// The transaction must restart at a new epoch
    #[error("transaction {} must retry: {reason}", txn.id)]
    TransactionRetry {
        /// Server copy with the timestamp and priority for the next epoch
        txn: Box<Transaction>,
        /// Why
        reason: String,
    },

    /// The transaction record is in an unexpected state
    #[error("transaction {} in unexpected state: {reason}", txn.id)]
    TransactionStatus {
        /// Server copy of the transaction
        txn: Box<Transaction>,
        /// Why
        reason: String,
    },

    // ---------------------------------------------------------------------
    // Other
    // ---------------------------------------------------------------------
    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation not supported by this component
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Operation name
        operation: String,
    },

    /// Local programming-contract violation
    #[error("contract violation: {reason}")]
    ContractViolation {
        /// What was violated
        reason: String,
    },

    /// Serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else
    #[error("internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

impl StrataError {
    /// Build an `InvalidArgument`
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        StrataError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Build an `Internal`
    pub fn internal(message: impl Into<String>) -> Self {
        StrataError::Internal {
            message: message.into(),
        }
    }

    /// Build a `ContractViolation`
    pub fn contract_violation(reason: impl Into<String>) -> Self {
        StrataError::ContractViolation {
            reason: reason.into(),
        }
    }

    /// Build a `TransactionRetry`
    pub fn retry(txn: &Transaction, reason: impl Into<String>) -> Self {
        StrataError::TransactionRetry {
            txn: Box::new(txn.clone()),
            reason: reason.into(),
        }
    }

    /// Build a `TransactionStatus`
    pub fn status(txn: &Transaction, reason: impl Into<String>) -> Self {
        StrataError::TransactionStatus {
            txn: Box::new(txn.clone()),
            reason: reason.into(),
        }
    }

    /// Malformed request or clock skew: fails once, never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StrataError::EmptyKey
                | StrataError::KeyTooLong { .. }
                | StrataError::InvalidRange { .. }
                | StrataError::RangeNotFound { .. }
                | StrataError::RangeKeyMismatch { .. }
                | StrataError::ClockOffset { .. }
                | StrataError::InvalidArgument { .. }
        )
    }

    /// Conflict with another transaction or with the transaction's own state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StrataError::WriteIntent { .. }
                | StrataError::WriteTooOld { .. }
                | StrataError::ReadWithinUncertaintyInterval { .. }
                | StrataError::TransactionAborted { .. }
                | StrataError::TransactionPush { .. }
                | StrataError::TransactionRetry { .. }
                | StrataError::TransactionStatus { .. }
        )
    }

    /// Local misuse; never a condition to branch on
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, StrataError::ContractViolation { .. })
    }

    /// Conflicts the caller can recover from by retrying the same transaction
    /// at a new epoch
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrataError::ReadWithinUncertaintyInterval { .. }
                | StrataError::TransactionPush { .. }
                | StrataError::TransactionRetry { .. }
        )
    }

    /// Short stable name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StrataError::EmptyKey => "EmptyKey",
            StrataError::KeyTooLong { .. } => "KeyTooLong",
            StrataError::InvalidRange { .. } => "InvalidRange",
            StrataError::RangeNotFound { .. } => "RangeNotFound",
            StrataError::RangeKeyMismatch { .. } => "RangeKeyMismatch",
            StrataError::ClockOffset { .. } => "ClockOffset",
            StrataError::InvalidArgument { .. } => "InvalidArgument",
            StrataError::WriteIntent { .. } => "WriteIntent",
            StrataError::WriteTooOld { .. } => "WriteTooOld",
            StrataError::ReadWithinUncertaintyInterval { .. } => "ReadWithinUncertaintyInterval",
            StrataError::TransactionAborted { .. } => "TransactionAborted",
            StrataError::TransactionPush { .. } => "TransactionPush",
            StrataError::TransactionRetry { .. } => "TransactionRetry",
            StrataError::TransactionStatus { .. } => "TransactionStatus",
            StrataError::Storage(_) => "Storage",
            StrataError::Unsupported { .. } => "Unsupported",
            StrataError::ContractViolation { .. } => "ContractViolation",
            StrataError::Serialization(_) => "Serialization",
            StrataError::Internal { .. } => "Internal",
        }
    }
}

impl From<bincode::Error> for StrataError {
    fn from(e: bincode::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}
