//! Store request handling: key validation, clock bookkeeping and range
//! routing.

use std::time::Duration;

use strata_core::{Key, Limits, RangeId, StrataError, Timestamp};

use super::{create_test_store, TEST_RANGE};
use crate::{RangeDescriptor, Request, ResponseBody};

fn too_long_key() -> Key {
    let key_max = Limits::default().key_max();
    Key::concat(&[key_max.as_bytes(), &[0u8][..]])
}

// =============================================================================
// Basic execution
// =============================================================================

#[test]
fn test_get_and_put() {
    let (store, _) = create_test_store();
    let resp = store.execute_cmd(Request::get("a").with_range(TEST_RANGE));
    assert_eq!(resp.into_result().unwrap(), ResponseBody::Get { value: None });

    let resp = store.execute_cmd(Request::put("a", "aaa").with_range(TEST_RANGE));
    assert!(resp.is_ok(), "{:?}", resp.error());

    let resp = store.execute_cmd(Request::get("a").with_range(TEST_RANGE));
    assert_eq!(
        resp.into_result().unwrap(),
        ResponseBody::Get {
            value: Some(b"aaa".to_vec())
        }
    );
}

#[test]
fn test_scan_returns_rows_in_order() {
    let (store, _) = create_test_store();
    for key in ["c", "a", "b"] {
        assert!(store.execute_cmd(Request::put(key, key).with_range(TEST_RANGE)).is_ok());
    }
    let resp = store.execute_cmd(Request::scan("a", "c", 0).with_range(TEST_RANGE));
    match resp.into_result().unwrap() {
        ResponseBody::Scan { rows } => {
            let keys: Vec<_> = rows.into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec![Key::from("a"), Key::from("b")]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

// =============================================================================
// Key validation
// =============================================================================

#[test]
fn test_verify_keys() {
    let (store, _) = create_test_store();

    let resp = store.execute_cmd(Request::get(too_long_key()).with_range(TEST_RANGE));
    assert!(resp.error().unwrap().is_validation(), "key too long");

    let resp = store.execute_cmd(Request::get(Limits::default().key_max()).with_range(TEST_RANGE));
    assert!(resp.error().unwrap().is_validation(), "start key == key max");

    let resp = store.execute_cmd(Request::scan(Key::MIN, too_long_key(), 1).with_range(TEST_RANGE));
    assert!(resp.error().unwrap().is_validation(), "end key too long");

    let resp = store.execute_cmd(Request::scan("b", "a", 1).with_range(TEST_RANGE));
    assert!(
        matches!(resp.error(), Some(StrataError::InvalidRange { .. })),
        "end key < start key: {:?}",
        resp.error()
    );
}

// =============================================================================
// Clock
// =============================================================================

#[test]
fn test_execute_updates_clock() {
    let (store, _) = create_test_store();
    let mut ts = store.clock().now();
    ts.wall_time += Duration::from_millis(100).as_nanos() as i64;

    let resp = store.execute_cmd(Request::get("a").with_timestamp(ts).with_range(TEST_RANGE));
    assert!(resp.is_ok(), "{:?}", resp.error());

    let clock_ts = store.clock().timestamp();
    assert_eq!(clock_ts.wall_time, ts.wall_time);
    assert!(clock_ts.logical > ts.logical);
}

#[test]
fn test_zero_timestamp_uses_store_clock() {
    let (store, manual) = create_test_store();
    manual.set(1);
    let resp = store.execute_cmd(Request::get("a").with_range(TEST_RANGE));
    assert!(resp.is_ok());
    assert_eq!(resp.header.timestamp.wall_time, store.clock().timestamp().wall_time);
    assert_eq!(resp.header.timestamp.wall_time, 1);
}

#[test]
fn test_timestamp_beyond_max_offset_rejected() {
    let (store, manual) = create_test_store();
    manual.set(1);
    let max_offset = Duration::from_millis(250);
    store.clock().set_max_offset(max_offset);

    let mut ts = store.clock().now();
    ts.wall_time += max_offset.as_nanos() as i64 + 1;
    let resp = store.execute_cmd(Request::get("a").with_timestamp(ts).with_range(TEST_RANGE));
    assert!(matches!(resp.error(), Some(StrataError::ClockOffset { .. })));
    // The clock did not jump to the remote time
    assert!(store.clock().timestamp().wall_time < ts.wall_time);
}

// =============================================================================
// Ranges
// =============================================================================

#[test]
fn test_unknown_range() {
    let (store, _) = create_test_store();
    let resp = store.execute_cmd(Request::get("0").with_range(RangeId(2)));
    assert_eq!(
        resp.error(),
        Some(&StrataError::RangeNotFound { range_id: RangeId(2) })
    );
}

#[test]
fn test_key_outside_range() {
    let (store, _) = create_test_store();
    store.remove_range(TEST_RANGE).unwrap();
    store
        .add_range(RangeDescriptor::new(RangeId(1), Key::MIN, Key::from("a")))
        .unwrap();

    let resp = store.execute_cmd(Request::get("a").with_range(RangeId(1)));
    match resp.error() {
        Some(StrataError::RangeKeyMismatch { range_id, .. }) => assert_eq!(*range_id, Some(RangeId(1))),
        other => panic!("expected range key mismatch, got {:?}", other),
    }
    assert!(store.execute_cmd(Request::get("0").with_range(RangeId(1))).is_ok());
}

#[test]
fn test_add_range_rejects_overlap_and_duplicates() {
    let (store, _) = create_test_store();
    let err = store
        .add_range(RangeDescriptor::new(RangeId(2), Key::from("m"), Key::from("n")))
        .unwrap_err();
    assert!(matches!(err, StrataError::InvalidArgument { .. }));

    store.remove_range(TEST_RANGE).unwrap();
    store
        .add_range(RangeDescriptor::new(RangeId(1), Key::MIN, Key::from("m")))
        .unwrap();
    store
        .add_range(RangeDescriptor::new(RangeId(2), Key::from("m"), Limits::default().key_max()))
        .unwrap();
    let err = store
        .add_range(RangeDescriptor::new(RangeId(2), Key::from("x"), Key::from("y")))
        .unwrap_err();
    assert!(matches!(err, StrataError::InvalidArgument { .. }));

    assert_eq!(store.lookup_range(&Key::from("l")).unwrap().id(), RangeId(1));
    assert_eq!(store.lookup_range(&Key::from("m")).unwrap().id(), RangeId(2));
    assert_eq!(store.ranges().len(), 2);
}

#[test]
fn test_remove_unknown_range() {
    let (store, _) = create_test_store();
    assert!(matches!(
        store.remove_range(RangeId(9)),
        Err(StrataError::RangeNotFound { .. })
    ));
}

// =============================================================================
// Write conflicts without transactions
// =============================================================================

#[test]
fn test_write_too_old_is_retried_at_later_timestamp() {
    let (store, _) = create_test_store();
    let early = store.clock().now();
    let late = store.clock().now();
    assert!(store
        .execute_cmd(Request::put("a", "new").with_timestamp(late).with_range(TEST_RANGE))
        .is_ok());

    let resp = store.execute_cmd(Request::put("a", "old").with_timestamp(early).with_range(TEST_RANGE));
    assert!(resp.is_ok(), "{:?}", resp.error());
    assert_eq!(resp.header.timestamp, late.next());
}

#[test]
fn test_failed_increment_is_reported() {
    let (store, _) = create_test_store();
    assert!(store.execute_cmd(Request::put("a", "not a number").with_range(TEST_RANGE)).is_ok());
    let resp = store.execute_cmd(Request::increment("a", 1).with_range(TEST_RANGE));
    assert!(matches!(resp.error(), Some(StrataError::InvalidArgument { .. })));
}

#[test]
fn test_stopped_store_rejects_commands() {
    let (store, _) = create_test_store();
    store.stop();
    assert!(store.is_stopped());
    let resp = store.execute_cmd(Request::get("a").with_range(TEST_RANGE));
    assert!(matches!(resp.error(), Some(StrataError::Internal { .. })));
    // Idempotent
    store.stop();
}

#[test]
fn test_timestamp_in_response_matches_request() {
    let (store, _) = create_test_store();
    let ts = Timestamp::new(0, 100);
    let resp = store.execute_cmd(Request::put("a", "v").with_timestamp(ts).with_range(TEST_RANGE));
    assert_eq!(resp.header.timestamp, ts);
}
