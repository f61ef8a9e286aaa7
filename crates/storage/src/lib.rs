//! Storage layer for Strata
//!
//! This crate implements the byte-level storage contract the transaction
//! engine runs on:
//! - Engine: ordered key/value trait with atomic batches, merges and snapshots
//! - InMemEngine: BTreeMap-based engine with RwLock
//! - MergeOperator: AppendMerge (default) and CounterMerge
//! - WriteBuffer: staged mutations applied atomically on commit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod in_mem;
pub mod merge;
pub mod write_buffer;

pub use engine::{BatchOp, Capacity, Engine, IterFn, KeyValue};
pub use error::{StorageError, StorageResult};
pub use in_mem::InMemEngine;
pub use merge::{AppendMerge, CounterMerge, MergeOperator};
pub use write_buffer::{PendingWrite, WriteBuffer};
