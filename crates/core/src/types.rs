//! Key and identifier types for Strata
//!
//! This module defines the addressing types shared by every layer:
//! - Key: an ordered byte string
//! - KeyRange: a half-open `[start, end)` interval of keys
//! - TxnId: transaction identity, derived from the first key a transaction touches
//! - RangeId / NodeId: identifiers for ranges and nodes

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An ordered byte-string key
///
/// Keys compare bytewise. The empty key is the minimum key; there is no
/// representable maximum, so the upper bound of the keyspace is enforced by
/// [`Limits::key_max`](crate::limits::Limits::key_max).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// The minimum key (empty)
    pub const MIN: Key = Key(Vec::new());

    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Raw bytes of the key
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty key
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The smallest key that sorts strictly after this one
    ///
    /// Appending a zero byte yields the immediate successor, so a point key
    /// `k` covers exactly the interval `[k, k.next())`.
    pub fn next(&self) -> Key {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0);
        Key(bytes)
    }

    /// True if `prefix` is a prefix of this key
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Build a key by concatenating parts
    pub fn concat(parts: &[&[u8]]) -> Key {
        Key(parts.concat())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key(b.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key(b)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

/// A half-open interval of keys `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub start: Key,
    /// Exclusive upper bound
    pub end: Key,
}

impl KeyRange {
    /// Create a range
    pub fn new(start: Key, end: Key) -> Self {
        KeyRange { start, end }
    }

    /// The single-key interval `[key, key.next())`
    pub fn point(key: Key) -> Self {
        let end = key.next();
        KeyRange { start: key, end }
    }

    /// Interval addressed by a request: a point key when `end` is absent
    pub fn from_span(key: &Key, end: Option<&Key>) -> Self {
        match end {
            Some(end) if end > key => KeyRange::new(key.clone(), end.clone()),
            _ => KeyRange::point(key.clone()),
        }
    }

    /// True when `key` lies inside the interval
    pub fn contains(&self, key: &Key) -> bool {
        key >= &self.start && key < &self.end
    }

    /// True when the two intervals share at least one key or touch end-to-start
    pub fn overlaps_or_abuts(&self, other: &KeyRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when the two intervals share at least one key
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True for a single-key interval
    pub fn is_point(&self) -> bool {
        self.end == self.start.next()
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Transaction identity
///
/// The bytes are the first key the transaction touched followed by a random
/// UUID, so the transaction record sorts next to (and is served by the same
/// range as) its base key, and two transactions starting at the same key never
/// collide. The empty id is reserved for "not yet begun".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(Vec<u8>);

impl TxnId {
    /// Generate a fresh id anchored at `base_key`
    pub fn generate(base_key: &Key) -> Self {
        let suffix = Uuid::new_v4();
        let mut bytes = Vec::with_capacity(base_key.len() + 16);
        bytes.extend_from_slice(base_key.as_bytes());
        bytes.extend_from_slice(suffix.as_bytes());
        TxnId(bytes)
    }

    /// Wrap existing id bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        TxnId(bytes.into())
    }

    /// The empty id ("begin a new transaction")
    pub fn empty() -> Self {
        TxnId(Vec::new())
    }

    /// True for the empty id
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The routing key for this transaction's record
    pub fn as_key(&self) -> Key {
        Key::new(self.0.clone())
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Identifier of a range (a contiguous slice of the keyspace served by a store)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RangeId(pub u64);

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of a node reachable through the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_next_is_immediate_successor() {
        let k = Key::from("a");
        let n = k.next();
        assert!(n > k);
        assert_eq!(n.as_bytes(), b"a\x00");
        // Nothing fits between "a" and "a\0"
        assert!(Key::from("aa") > n);
    }

    #[test]
    fn test_key_ordering_is_bytewise() {
        assert!(Key::MIN < Key::from("a"));
        assert!(Key::from("a") < Key::from("aa"));
        assert!(Key::from("aa") < Key::from("b"));
    }

    #[test]
    fn test_key_range_point() {
        let r = KeyRange::point(Key::from("a"));
        assert!(r.is_point());
        assert!(r.contains(&Key::from("a")));
        assert!(!r.contains(&Key::from("aa")));
    }

    #[test]
    fn test_key_range_from_span() {
        let k = Key::from("a");
        assert_eq!(KeyRange::from_span(&k, None), KeyRange::point(k.clone()));
        let e = Key::from("c");
        assert_eq!(
            KeyRange::from_span(&k, Some(&e)),
            KeyRange::new(k.clone(), e.clone())
        );
        // An end key that does not lie past the start degrades to a point
        assert_eq!(KeyRange::from_span(&k, Some(&k)), KeyRange::point(k));
    }

    #[test]
    fn test_key_range_overlap_and_abut() {
        let ab = KeyRange::new(Key::from("a"), Key::from("b"));
        let bc = KeyRange::new(Key::from("b"), Key::from("c"));
        let cd = KeyRange::new(Key::from("c"), Key::from("d"));
        assert!(!ab.overlaps(&bc));
        assert!(ab.overlaps_or_abuts(&bc));
        assert!(!ab.overlaps_or_abuts(&cd));
    }

    #[test]
    fn test_txn_id_prefixed_by_base_key() {
        let key = Key::from("key");
        let id1 = TxnId::generate(&key);
        let id2 = TxnId::generate(&key);
        assert!(id1.as_key().has_prefix(b"key"));
        assert_ne!(id1, id2);
        assert!(!id1.is_empty());
        assert!(TxnId::empty().is_empty());
    }

    #[test]
    fn test_key_display_escapes() {
        assert_eq!(Key::new(vec![b'a', 0]).to_string(), "\"a\\x00\"");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_next_is_smallest_greater_key(
                a in proptest::collection::vec(any::<u8>(), 0..8),
                b in proptest::collection::vec(any::<u8>(), 0..8),
            ) {
                let (a, b) = (Key::new(a), Key::new(b));
                prop_assert!(a < a.next());
                if a < b {
                    prop_assert!(a.next() <= b);
                }
            }

            #[test]
            fn prop_overlap_implies_overlaps_or_abuts(
                s1 in 0u8..16, l1 in 1u8..8, s2 in 0u8..16, l2 in 1u8..8,
            ) {
                let r1 = KeyRange::new(Key::new(vec![s1]), Key::new(vec![s1 + l1]));
                let r2 = KeyRange::new(Key::new(vec![s2]), Key::new(vec![s2 + l2]));
                prop_assert_eq!(r1.overlaps(&r2), r2.overlaps(&r1));
                if r1.overlaps(&r2) {
                    prop_assert!(r1.overlaps_or_abuts(&r2));
                }
            }
        }
    }
}
