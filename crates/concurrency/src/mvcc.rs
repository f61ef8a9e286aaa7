//! Multi-version reads and writes with write intents
//!
//! Each user key has one metadata record describing its newest version and,
//! when that version is provisional, the transaction that owns it (the write
//! intent). Versions are stored under the key's encoded prefix, newest first.
//!
//! Rules enforced here:
//! - at most one intent per key
//! - reads fail with `WriteIntent` on a foreign intent at or below the read
//!   timestamp, and with `ReadWithinUncertaintyInterval` on a committed
//!   version between the read timestamp and the transaction's max timestamp;
//!   foreign intents above the read timestamp are skipped
//! - writes fail with `WriteIntent` on any foreign intent and with
//!   `WriteTooOld` at or below the newest committed version
//! - an owner always sees (and may rewrite) its own current-epoch intent
//!
//! All functions take an `&dyn Engine`, so they run equally against the raw
//! engine or a [`WriteBuffer`](strata_storage::WriteBuffer).

use serde::{Deserialize, Serialize};
use strata_core::{Key, StrataError, StrataResult, Timestamp, Transaction, TransactionStatus};
use strata_storage::Engine;
use tracing::{debug, trace};

use crate::encoding::{decode_key, encode_key, encode_range_end, encode_version_key, key_end, DecodedKey};

/// Per-key metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvccMetadata {
    /// Owner of the newest version when it is an intent
    pub txn: Option<Transaction>,
    /// Timestamp of the newest version
    pub timestamp: Timestamp,
    /// True when the newest version is a deletion
    pub deleted: bool,
}

impl MvccMetadata {
    /// True when the newest version is an uncommitted intent
    pub fn is_intent(&self) -> bool {
        self.txn.is_some()
    }
}

/// One stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvccValue {
    /// Value bytes; `None` is a tombstone
    pub value: Option<Vec<u8>>,
}

fn read_meta(engine: &dyn Engine, key: &Key) -> StrataResult<Option<MvccMetadata>> {
    match engine.get(&encode_key(key))? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn write_meta(engine: &dyn Engine, key: &Key, meta: &MvccMetadata) -> StrataResult<()> {
    engine.put(&encode_key(key), &bincode::serialize(meta)?)?;
    Ok(())
}

fn read_version(engine: &dyn Engine, key: &Key, ts: Timestamp) -> StrataResult<Option<MvccValue>> {
    match engine.get(&encode_version_key(key, ts))? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn write_version(engine: &dyn Engine, key: &Key, ts: Timestamp, value: &MvccValue) -> StrataResult<()> {
    engine.put(&encode_version_key(key, ts), &bincode::serialize(value)?)?;
    Ok(())
}

/// Newest version of `key` at or below `upper`, skipping the one at `skip`
fn newest_version(
    engine: &dyn Engine,
    key: &Key,
    upper: Timestamp,
    skip: Option<Timestamp>,
) -> StrataResult<Option<(Timestamp, MvccValue)>> {
    let mut found: Option<(Timestamp, Vec<u8>)> = None;
    engine.iterate(&encode_version_key(key, upper), &key_end(key), &mut |k, v| {
        if let Some(DecodedKey::Version(_, ts)) = decode_key(k) {
            if Some(ts) != skip {
                found = Some((ts, v.to_vec()));
                return Ok(true);
            }
        }
        Ok(false)
    })?;
    match found {
        Some((ts, bytes)) => Ok(Some((ts, bincode::deserialize(&bytes)?))),
        None => Ok(None),
    }
}

fn write_intent_error(key: &Key, owner: &Transaction) -> StrataError {
    StrataError::WriteIntent {
        key: key.clone(),
        txn: Box::new(owner.clone()),
        resolved: false,
    }
}

/// Read `key` as of `ts`
///
/// # Arguments
///
/// * `ts` - read timestamp
/// * `txn` - reading transaction, if any; widens the read to the
///   transaction's uncertainty window and makes its own intents visible
pub fn mvcc_get(engine: &dyn Engine, key: &Key, ts: Timestamp, txn: Option<&Transaction>) -> StrataResult<Option<Vec<u8>>> {
    if key.is_empty() {
        return Err(StrataError::EmptyKey);
    }
    let Some(meta) = read_meta(engine, key)? else {
        return Ok(None);
    };
    let upper = txn.map(|t| ts.max(t.read_upper_bound())).unwrap_or(ts);

    let mut skip = None;
    if let Some(owner) = &meta.txn {
        match txn {
            Some(reader) if reader.id == owner.id => {
                if owner.epoch == reader.epoch {
                    return Ok(read_version(engine, key, meta.timestamp)?.and_then(|v| v.value));
                }
                // Intent from an earlier epoch of this transaction is not part
                // of the current attempt.
                skip = Some(meta.timestamp);
            }
            _ if meta.timestamp <= ts => return Err(write_intent_error(key, owner)),
            // An uncommitted write above the read timestamp orders after the
            // read, even inside the uncertainty window.
            _ => skip = Some(meta.timestamp),
        }
    }

    match newest_version(engine, key, upper, skip)? {
        Some((version_ts, _)) if version_ts > ts => Err(StrataError::ReadWithinUncertaintyInterval {
            timestamp: ts,
            existing: version_ts,
        }),
        Some((_, value)) => Ok(value.value),
        None => Ok(None),
    }
}

/// Write `value` (or a deletion when `None`) to `key` at `ts`
pub fn mvcc_put(
    engine: &dyn Engine,
    key: &Key,
    ts: Timestamp,
    value: Option<Vec<u8>>,
    txn: Option<&Transaction>,
) -> StrataResult<()> {
    if key.is_empty() {
        return Err(StrataError::EmptyKey);
    }
    if let Some(meta) = read_meta(engine, key)? {
        match (&meta.txn, txn) {
            (Some(owner), Some(writer)) if owner.id == writer.id => {
                if owner.epoch > writer.epoch {
                    return Err(StrataError::status(
                        writer,
                        format!("intent at {} belongs to newer epoch {}", key, owner.epoch),
                    ));
                }
                if meta.timestamp != ts {
                    engine.clear(&encode_version_key(key, meta.timestamp))?;
                }
            }
            (Some(owner), _) => return Err(write_intent_error(key, owner)),
            (None, _) => {
                if ts <= meta.timestamp {
                    return Err(StrataError::WriteTooOld {
                        timestamp: ts,
                        existing: meta.timestamp,
                    });
                }
            }
        }
    }

    let deleted = value.is_none();
    write_version(engine, key, ts, &MvccValue { value })?;
    write_meta(
        engine,
        key,
        &MvccMetadata {
            txn: txn.cloned(),
            timestamp: ts,
            deleted,
        },
    )?;
    trace!(target: "strata::mvcc", key = %key, ts = %ts, deleted, intent = txn.is_some(), "wrote version");
    Ok(())
}

/// Delete `key` at `ts`
pub fn mvcc_delete(engine: &dyn Engine, key: &Key, ts: Timestamp, txn: Option<&Transaction>) -> StrataResult<()> {
    mvcc_put(engine, key, ts, None, txn)
}

/// Add `delta` to the big-endian `i64` stored at `key` (absent counts as 0)
///
/// Returns the new value. A zero `delta` only reads.
pub fn mvcc_increment(
    engine: &dyn Engine,
    key: &Key,
    ts: Timestamp,
    txn: Option<&Transaction>,
    delta: i64,
) -> StrataResult<i64> {
    // A write must never read past a foreign intent, whatever its timestamp.
    if let Some(meta) = read_meta(engine, key)? {
        if let Some(owner) = &meta.txn {
            if txn.map_or(true, |t| t.id != owner.id) {
                return Err(write_intent_error(key, owner));
            }
        }
    }
    let current = match mvcc_get(engine, key, ts, txn)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                StrataError::invalid_argument(format!("key {} does not contain an integer value", key))
            })?;
            i64::from_be_bytes(arr)
        }
        None => 0,
    };
    if delta == 0 {
        return Ok(current);
    }
    let new_value = current
        .checked_add(delta)
        .ok_or_else(|| StrataError::invalid_argument(format!("increment of {} overflows", key)))?;
    mvcc_put(engine, key, ts, Some(new_value.to_be_bytes().to_vec()), txn)?;
    Ok(new_value)
}

/// Collect the user keys that have metadata in `[start, end)`
fn keys_in_range(engine: &dyn Engine, start: &Key, end: &Key) -> StrataResult<Vec<Key>> {
    let mut keys = Vec::new();
    engine.iterate(&encode_key(start), &encode_range_end(end), &mut |k, _| {
        if let Some(DecodedKey::Meta(key)) = decode_key(k) {
            keys.push(key);
        }
        Ok(false)
    })?;
    Ok(keys)
}

/// Read up to `max` live key/value pairs in `[start, end)` as of `ts`
/// (0 = unlimited; an empty `end` means unbounded)
pub fn mvcc_scan(
    engine: &dyn Engine,
    start: &Key,
    end: &Key,
    max: usize,
    ts: Timestamp,
    txn: Option<&Transaction>,
) -> StrataResult<Vec<(Key, Vec<u8>)>> {
    let mut out = Vec::new();
    for key in keys_in_range(engine, start, end)? {
        if max != 0 && out.len() >= max {
            break;
        }
        if key.is_empty() {
            continue;
        }
        if let Some(value) = mvcc_get(engine, &key, ts, txn)? {
            out.push((key, value));
        }
    }
    Ok(out)
}

/// Resolve `txn`'s intent on `key`, if there is one
///
/// - COMMITTED in the intent's epoch: the version moves to `txn.timestamp`
///   and becomes a committed value
/// - PENDING: the version moves forward to `txn.timestamp`, still an intent
/// - ABORTED, or committed from a later epoch: the intent is removed and the
///   key rolls back to its previous committed version
///
/// Intents owned by other transactions are left untouched.
pub fn mvcc_resolve_write_intent(engine: &dyn Engine, key: &Key, txn: &Transaction) -> StrataResult<()> {
    let Some(meta) = read_meta(engine, key)? else {
        return Ok(());
    };
    let owner = match &meta.txn {
        Some(owner) if owner.id == txn.id => owner.clone(),
        _ => return Ok(()),
    };

    let commit = txn.status == TransactionStatus::Committed && txn.epoch == owner.epoch;
    let push = txn.status == TransactionStatus::Pending;

    if commit || push {
        let mut new_ts = meta.timestamp;
        if commit {
            new_ts = txn.timestamp;
        } else {
            new_ts.forward(txn.timestamp);
        }
        if new_ts != meta.timestamp {
            let value = read_version(engine, key, meta.timestamp)?.unwrap_or(MvccValue { value: None });
            engine.clear(&encode_version_key(key, meta.timestamp))?;
            write_version(engine, key, new_ts, &value)?;
        }
        let intent = if commit {
            None
        } else {
            let mut updated = owner;
            updated.timestamp.forward(new_ts);
            Some(updated)
        };
        write_meta(
            engine,
            key,
            &MvccMetadata {
                txn: intent,
                timestamp: new_ts,
                deleted: meta.deleted,
            },
        )?;
        debug!(target: "strata::mvcc", key = %key, txn = %txn.id, ts = %new_ts, commit, "resolved intent");
        return Ok(());
    }

    // Abort: drop the intent version and roll metadata back.
    engine.clear(&encode_version_key(key, meta.timestamp))?;
    match newest_version(engine, key, Timestamp::MAX, Some(meta.timestamp))? {
        Some((prev_ts, prev)) => write_meta(
            engine,
            key,
            &MvccMetadata {
                txn: None,
                timestamp: prev_ts,
                deleted: prev.value.is_none(),
            },
        )?,
        None => engine.clear(&encode_key(key))?,
    }
    debug!(target: "strata::mvcc", key = %key, txn = %txn.id, "removed aborted intent");
    Ok(())
}

/// Resolve `txn`'s intents in `[start, end)`; at most `max` keys are visited
/// (0 = unlimited). Returns the number of keys visited.
pub fn mvcc_resolve_write_intent_range(
    engine: &dyn Engine,
    start: &Key,
    end: &Key,
    max: usize,
    txn: &Transaction,
) -> StrataResult<usize> {
    let mut visited = 0;
    for key in keys_in_range(engine, start, end)? {
        if max != 0 && visited >= max {
            break;
        }
        mvcc_resolve_write_intent(engine, &key, txn)?;
        visited += 1;
    }
    Ok(visited)
}

/// Read the metadata record of `key`, for inspection
pub fn mvcc_metadata(engine: &dyn Engine, key: &Key) -> StrataResult<Option<MvccMetadata>> {
    read_meta(engine, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::IsolationLevel;
    use strata_storage::{InMemEngine, WriteBuffer};
    use std::sync::Arc;

    fn ts(w: i64, l: i32) -> Timestamp {
        Timestamp::new(w, l)
    }

    fn txn_at(key: &str, at: Timestamp) -> Transaction {
        Transaction::new("test", Key::from(key), -1, IsolationLevel::Serializable, at, 0)
    }

    fn k(s: &str) -> Key {
        Key::from(s)
    }

    #[test]
    fn test_get_reads_newest_visible_version() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(1, 0), Some(b"v1".to_vec()), None).unwrap();
        mvcc_put(&e, &k("a"), ts(3, 0), Some(b"v3".to_vec()), None).unwrap();
        assert_eq!(mvcc_get(&e, &k("a"), ts(0, 5), None).unwrap(), None);
        assert_eq!(mvcc_get(&e, &k("a"), ts(2, 0), None).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(mvcc_get(&e, &k("a"), ts(3, 0), None).unwrap(), Some(b"v3".to_vec()));
        assert_eq!(mvcc_get(&e, &k("b"), ts(3, 0), None).unwrap(), None);
    }

    #[test]
    fn test_delete_writes_tombstone() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(1, 0), Some(b"v".to_vec()), None).unwrap();
        mvcc_delete(&e, &k("a"), ts(2, 0), None).unwrap();
        assert_eq!(mvcc_get(&e, &k("a"), ts(2, 0), None).unwrap(), None);
        assert_eq!(mvcc_get(&e, &k("a"), ts(1, 0), None).unwrap(), Some(b"v".to_vec()));
        assert!(mvcc_metadata(&e, &k("a")).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_write_too_old() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), None).unwrap();
        let err = mvcc_put(&e, &k("a"), ts(5, 0), Some(b"w".to_vec()), None).unwrap_err();
        assert_eq!(
            err,
            StrataError::WriteTooOld {
                timestamp: ts(5, 0),
                existing: ts(5, 0)
            }
        );
        let txn = txn_at("a", ts(4, 0));
        assert!(matches!(
            mvcc_put(&e, &k("a"), ts(4, 0), Some(b"w".to_vec()), Some(&txn)),
            Err(StrataError::WriteTooOld { .. })
        ));
    }

    #[test]
    fn test_foreign_intent_blocks_reads_and_writes() {
        let e = InMemEngine::default();
        let owner = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), Some(&owner)).unwrap();

        // Non-transactional read below the intent sees nothing and no conflict
        assert_eq!(mvcc_get(&e, &k("a"), ts(4, 0), None).unwrap(), None);
        // At or above the intent it conflicts
        match mvcc_get(&e, &k("a"), ts(5, 0), None).unwrap_err() {
            StrataError::WriteIntent { txn, resolved, .. } => {
                assert_eq!(txn.id, owner.id);
                assert!(!resolved);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Writes conflict regardless of timestamp
        assert!(matches!(
            mvcc_put(&e, &k("a"), ts(1, 0), Some(b"w".to_vec()), None),
            Err(StrataError::WriteIntent { .. })
        ));
        let other = txn_at("a", ts(6, 0));
        assert!(matches!(
            mvcc_put(&e, &k("a"), ts(6, 0), Some(b"w".to_vec()), Some(&other)),
            Err(StrataError::WriteIntent { .. })
        ));
    }

    #[test]
    fn test_intent_inside_uncertainty_window_is_skipped() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(1, 0), Some(b"old".to_vec()), None).unwrap();
        let owner = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), Some(&owner)).unwrap();
        let mut reader = txn_at("b", ts(3, 0));
        reader.max_timestamp = ts(6, 0);
        assert_eq!(mvcc_get(&e, &k("a"), ts(3, 0), Some(&reader)).unwrap(), Some(b"old".to_vec()));
        // Once the read timestamp reaches the intent it conflicts
        assert!(matches!(
            mvcc_get(&e, &k("a"), ts(5, 0), Some(&reader)),
            Err(StrataError::WriteIntent { .. })
        ));
    }

    #[test]
    fn test_read_within_uncertainty_interval() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(10, 10), Some(b"v".to_vec()), None).unwrap();
        let mut reader = txn_at("a", ts(5, 0));
        reader.max_timestamp = ts(20, 0);
        assert_eq!(
            mvcc_get(&e, &k("a"), ts(5, 0), Some(&reader)).unwrap_err(),
            StrataError::ReadWithinUncertaintyInterval {
                timestamp: ts(5, 0),
                existing: ts(10, 10)
            }
        );
        // Outside the window the old (absent) value is read
        reader.max_timestamp = ts(9, 0);
        assert_eq!(mvcc_get(&e, &k("a"), ts(5, 0), Some(&reader)).unwrap(), None);
    }

    #[test]
    fn test_own_intent_visible_and_rewritable() {
        let e = InMemEngine::default();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v1".to_vec()), Some(&txn)).unwrap();
        assert_eq!(mvcc_get(&e, &k("a"), ts(1, 0), Some(&txn)).unwrap(), Some(b"v1".to_vec()));

        txn.timestamp = ts(6, 0);
        mvcc_put(&e, &k("a"), ts(6, 0), Some(b"v2".to_vec()), Some(&txn)).unwrap();
        assert_eq!(mvcc_get(&e, &k("a"), ts(6, 0), Some(&txn)).unwrap(), Some(b"v2".to_vec()));
        // The superseded intent version is gone
        assert!(read_version(&e, &k("a"), ts(5, 0)).unwrap().is_none());
    }

    #[test]
    fn test_own_intent_from_old_epoch_skipped() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(1, 0), Some(b"committed".to_vec()), None).unwrap();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"stale".to_vec()), Some(&txn)).unwrap();
        txn.restart(1, ts(6, 0));
        assert_eq!(mvcc_get(&e, &k("a"), ts(6, 0), Some(&txn)).unwrap(), Some(b"committed".to_vec()));

        // A writer from an older epoch than the intent is rejected
        let mut stale = txn.clone();
        stale.epoch = 0;
        mvcc_put(&e, &k("a"), ts(6, 0), Some(b"x".to_vec()), Some(&txn)).unwrap();
        assert!(matches!(
            mvcc_put(&e, &k("a"), ts(7, 0), Some(b"y".to_vec()), Some(&stale)),
            Err(StrataError::TransactionStatus { .. })
        ));
    }

    #[test]
    fn test_increment() {
        let e = InMemEngine::default();
        assert_eq!(mvcc_increment(&e, &k("n"), ts(1, 0), None, 5).unwrap(), 5);
        assert_eq!(mvcc_increment(&e, &k("n"), ts(2, 0), None, -2).unwrap(), 3);
        assert_eq!(mvcc_increment(&e, &k("n"), ts(3, 0), None, 0).unwrap(), 3);

        mvcc_put(&e, &k("s"), ts(1, 0), Some(b"abc".to_vec()), None).unwrap();
        assert!(matches!(
            mvcc_increment(&e, &k("s"), ts(2, 0), None, 1),
            Err(StrataError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_increment_conflicts_with_future_intent() {
        let e = InMemEngine::default();
        let owner = txn_at("n", ts(9, 0));
        mvcc_put(&e, &k("n"), ts(9, 0), Some(1i64.to_be_bytes().to_vec()), Some(&owner)).unwrap();
        assert!(matches!(
            mvcc_increment(&e, &k("n"), ts(2, 0), None, 1),
            Err(StrataError::WriteIntent { .. })
        ));
    }

    #[test]
    fn test_scan() {
        let e = InMemEngine::default();
        for (key, t) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            mvcc_put(&e, &k(key), ts(t, 0), Some(key.as_bytes().to_vec()), None).unwrap();
        }
        mvcc_delete(&e, &k("b"), ts(5, 0), None).unwrap();

        let all = mvcc_scan(&e, &Key::MIN, &Key::MIN, 0, ts(10, 0), None).unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![k("a"), k("c"), k("d")]);

        let early = mvcc_scan(&e, &k("a"), &k("d"), 0, ts(2, 0), None).unwrap();
        assert_eq!(early, vec![(k("a"), b"a".to_vec()), (k("b"), b"b".to_vec())]);

        assert_eq!(mvcc_scan(&e, &k("a"), &k("z"), 2, ts(10, 0), None).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_commit() {
        let e = InMemEngine::default();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), Some(&txn)).unwrap();
        txn.status = TransactionStatus::Committed;
        txn.timestamp = ts(7, 0);
        mvcc_resolve_write_intent(&e, &k("a"), &txn).unwrap();

        let meta = mvcc_metadata(&e, &k("a")).unwrap().unwrap();
        assert!(!meta.is_intent());
        assert_eq!(meta.timestamp, ts(7, 0));
        assert_eq!(mvcc_get(&e, &k("a"), ts(7, 0), None).unwrap(), Some(b"v".to_vec()));
        assert_eq!(mvcc_get(&e, &k("a"), ts(6, 0), None).unwrap(), None);
    }

    #[test]
    fn test_resolve_push_keeps_intent() {
        let e = InMemEngine::default();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), Some(&txn)).unwrap();
        txn.timestamp = ts(8, 1);
        mvcc_resolve_write_intent(&e, &k("a"), &txn).unwrap();

        let meta = mvcc_metadata(&e, &k("a")).unwrap().unwrap();
        assert!(meta.is_intent());
        assert_eq!(meta.timestamp, ts(8, 1));
        // Readers below the pushed intent are no longer blocked
        assert_eq!(mvcc_get(&e, &k("a"), ts(8, 0), None).unwrap(), None);
    }

    #[test]
    fn test_resolve_abort_rolls_back() {
        let e = InMemEngine::default();
        mvcc_put(&e, &k("a"), ts(1, 0), Some(b"old".to_vec()), None).unwrap();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"new".to_vec()), Some(&txn)).unwrap();
        mvcc_put(&e, &k("b"), ts(5, 0), Some(b"new".to_vec()), Some(&txn)).unwrap();
        txn.status = TransactionStatus::Aborted;

        assert_eq!(mvcc_resolve_write_intent_range(&e, &k("a"), &k("c"), 0, &txn).unwrap(), 2);
        let meta = mvcc_metadata(&e, &k("a")).unwrap().unwrap();
        assert!(!meta.is_intent());
        assert_eq!(meta.timestamp, ts(1, 0));
        assert_eq!(mvcc_get(&e, &k("a"), ts(9, 0), None).unwrap(), Some(b"old".to_vec()));
        assert!(mvcc_metadata(&e, &k("b")).unwrap().is_none());
    }

    #[test]
    fn test_resolve_ignores_other_transactions() {
        let e = InMemEngine::default();
        let owner = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"v".to_vec()), Some(&owner)).unwrap();
        let mut other = txn_at("a", ts(5, 0));
        other.status = TransactionStatus::Aborted;
        mvcc_resolve_write_intent(&e, &k("a"), &other).unwrap();
        assert!(mvcc_metadata(&e, &k("a")).unwrap().unwrap().is_intent());
    }

    #[test]
    fn test_resolve_commit_from_newer_epoch_discards_stale_intent() {
        let e = InMemEngine::default();
        let mut txn = txn_at("a", ts(5, 0));
        mvcc_put(&e, &k("a"), ts(5, 0), Some(b"stale".to_vec()), Some(&txn)).unwrap();
        txn.restart(1, ts(6, 0));
        txn.status = TransactionStatus::Committed;
        mvcc_resolve_write_intent(&e, &k("a"), &txn).unwrap();
        assert!(mvcc_metadata(&e, &k("a")).unwrap().is_none());
    }

    #[test]
    fn test_runs_through_write_buffer() {
        let engine = Arc::new(InMemEngine::default());
        let buffer = WriteBuffer::new(engine.clone());
        mvcc_put(&buffer, &k("a"), ts(1, 0), Some(b"v".to_vec()), None).unwrap();
        assert_eq!(mvcc_get(&buffer, &k("a"), ts(1, 0), None).unwrap(), Some(b"v".to_vec()));
        assert_eq!(mvcc_get(engine.as_ref(), &k("a"), ts(1, 0), None).unwrap(), None);
        buffer.commit().unwrap();
        assert_eq!(mvcc_get(engine.as_ref(), &k("a"), ts(1, 0), None).unwrap(), Some(b"v".to_vec()));
    }
}
