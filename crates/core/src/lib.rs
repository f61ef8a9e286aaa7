//! Core types for Strata
//!
//! This crate defines the vocabulary shared by every layer of the
//! transaction engine:
//! - Key / KeyRange: ordered byte keys and half-open intervals
//! - Timestamp: hybrid logical timestamps
//! - HybridClock: the node clock, over a pluggable physical source
//! - Transaction: the transaction record, isolation levels and priorities
//! - StrataError: the error taxonomy (validation, conflict, contract)
//! - Limits: key size limits and request key validation
//! - RetryOptions: bounded exponential backoff

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hlc;
pub mod limits;
pub mod retry;
pub mod timestamp;
pub mod transaction;
pub mod types;

pub use error::{StrataError, StrataResult};
pub use hlc::{HybridClock, ManualClock, PhysicalClock, SystemClock};
pub use limits::{Limits, DEFAULT_MAX_KEY_BYTES};
pub use retry::{retry_with_backoff, MaxAttemptsExceeded, RetryOptions, RetryStatus};
pub use timestamp::Timestamp;
pub use transaction::{make_priority, IsolationLevel, Transaction, TransactionStatus};
pub use types::{Key, KeyRange, NodeId, RangeId, TxnId};
