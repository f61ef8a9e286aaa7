//! Concurrency layer for Strata
//!
//! This crate implements multi-version concurrency control with write
//! intents:
//! - encoding: order-preserving MVCC key layout, newest version first
//! - mvcc: versioned get/put/delete/increment/scan and intent resolution
//! - txn_record: durable transaction records under a local key prefix
//! - push: the push-transaction decision (abort, push timestamp, or fail)
//!
//! Everything here runs against an [`Engine`](strata_storage::Engine), so
//! callers stage a command in a [`WriteBuffer`](strata_storage::WriteBuffer)
//! and commit it atomically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod mvcc;
pub mod push;
pub mod txn_record;

pub use encoding::{decode_key, encode_key, encode_version_key, key_end, DecodedKey};
pub use mvcc::{
    mvcc_delete, mvcc_get, mvcc_increment, mvcc_metadata, mvcc_put, mvcc_resolve_write_intent,
    mvcc_resolve_write_intent_range, mvcc_scan, MvccMetadata, MvccValue,
};
pub use push::{push_txn, PushOutcome, PushRequest};
pub use txn_record::{get_txn_record, put_txn_record, txn_record_key, LOCAL_PREFIX};
