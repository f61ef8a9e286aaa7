//! Durable transaction records
//!
//! The authoritative copy of each transaction lives under an unversioned
//! local key derived from its id. Records are read during conflict
//! resolution, written by heartbeats, pushes and end-of-transaction.

use strata_core::{StrataResult, Transaction, TxnId};
use strata_storage::Engine;

/// Prefix of all unversioned local records; sorts before every MVCC key
pub const LOCAL_PREFIX: &[u8] = b"\x00\x00\x00";

const TXN_SUFFIX: &[u8] = b"txn-";

/// Engine key of the record for `id`
pub fn txn_record_key(id: &TxnId) -> Vec<u8> {
    let mut key = Vec::with_capacity(LOCAL_PREFIX.len() + TXN_SUFFIX.len() + id.as_bytes().len());
    key.extend_from_slice(LOCAL_PREFIX);
    key.extend_from_slice(TXN_SUFFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Load the record for `id`, if one was written
pub fn get_txn_record(engine: &dyn Engine, id: &TxnId) -> StrataResult<Option<Transaction>> {
    match engine.get(&txn_record_key(id))? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

/// Store `txn` as its own record
pub fn put_txn_record(engine: &dyn Engine, txn: &Transaction) -> StrataResult<()> {
    engine.put(&txn_record_key(&txn.id), &bincode::serialize(txn)?)?;
    Ok(())
}
