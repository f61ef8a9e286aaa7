//! Order-preserving MVCC key encoding
//!
//! Every user key owns a contiguous slice of the engine keyspace:
//!
//! ```text
//! escape(key) 0x00 0x01                      metadata record
//! escape(key) 0x00 0x01 <12-byte ts suffix>  one entry per version
//! ```
//!
//! `escape` rewrites `0x00` as `0x00 0xff`, so the `0x00 0x01` terminator
//! never occurs inside a key and encoded keys sort exactly like user keys.
//! The timestamp suffix is stored bit-inverted so the newest version of a key
//! sorts first. Nothing encoded here starts with `0x00 0x00`; that prefix is
//! left for unversioned local records (see [`crate::txn_record`]).

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use strata_core::{Key, Timestamp};

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xff;
const TERMINATOR: u8 = 0x01;

/// Length of the version suffix
pub const TIMESTAMP_SUFFIX_LEN: usize = 12;

/// Encode a key's metadata location
pub fn encode_key(key: &Key) -> Vec<u8> {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 2 + TIMESTAMP_SUFFIX_LEN);
    for &b in bytes {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_NUL);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
    out
}

/// Encode the location of the version of `key` written at `ts`
pub fn encode_version_key(key: &Key, ts: Timestamp) -> Vec<u8> {
    let mut out = encode_key(key);
    append_timestamp(&mut out, ts);
    out
}

/// Exclusive upper bound of everything stored for `key`
pub fn key_end(key: &Key) -> Vec<u8> {
    let mut out = encode_key(key);
    if let Some(last) = out.last_mut() {
        *last = TERMINATOR + 1;
    }
    out
}

/// Encoded bound for a user range end; an empty key means unbounded
pub fn encode_range_end(end: &Key) -> Vec<u8> {
    if end.is_empty() {
        Vec::new()
    } else {
        encode_key(end)
    }
}

fn append_timestamp(out: &mut Vec<u8>, ts: Timestamp) {
    // Flip the sign bit for order preservation, then invert for descending order.
    let wall = !((ts.wall_time as u64) ^ (1 << 63));
    let logical = !((ts.logical as u32) ^ (1 << 31));
    // Writes into a Vec cannot fail
    let _ = out.write_u64::<BigEndian>(wall);
    let _ = out.write_u32::<BigEndian>(logical);
}

fn decode_timestamp(suffix: &[u8]) -> Option<Timestamp> {
    if suffix.len() != TIMESTAMP_SUFFIX_LEN {
        return None;
    }
    let wall = (!BigEndian::read_u64(&suffix[..8]) ^ (1 << 63)) as i64;
    let logical = (!BigEndian::read_u32(&suffix[8..]) ^ (1 << 31)) as i32;
    Some(Timestamp::new(wall, logical))
}

/// A decoded engine key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedKey {
    /// Metadata record for a user key
    Meta(Key),
    /// A version of a user key
    Version(Key, Timestamp),
}

impl DecodedKey {
    /// The user key
    pub fn key(&self) -> &Key {
        match self {
            DecodedKey::Meta(k) | DecodedKey::Version(k, _) => k,
        }
    }
}

/// Decode an engine key produced by this module
///
/// Returns `None` for keys outside the MVCC keyspace (or malformed ones).
pub fn decode_key(encoded: &[u8]) -> Option<DecodedKey> {
    let mut key = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        let b = encoded[i];
        if b != ESCAPE {
            key.push(b);
            i += 1;
            continue;
        }
        match encoded.get(i + 1) {
            Some(&ESCAPED_NUL) => {
                key.push(ESCAPE);
                i += 2;
            }
            Some(&TERMINATOR) => {
                let rest = &encoded[i + 2..];
                let key = Key::new(key);
                if rest.is_empty() {
                    return Some(DecodedKey::Meta(key));
                }
                return decode_timestamp(rest).map(|ts| DecodedKey::Version(key, ts));
            }
            _ => return None,
        }
    }
    None
}
