//! Test modules for the executor crate.

pub mod store_execute;

use std::sync::Arc;

use strata_core::{
    HybridClock, IsolationLevel, Key, Limits, ManualClock, RangeId, RetryOptions, Transaction,
};
use strata_storage::InMemEngine;

use crate::{NoopReplication, RangeDescriptor, Replication, Store, StoreConfig};

/// Range id of the single range every test store starts with
pub const TEST_RANGE: RangeId = RangeId(1);

/// Retry options that give up quickly
pub fn fast_retry() -> RetryOptions {
    RetryOptions {
        backoff_ms: 1,
        max_backoff_ms: 2,
        constant: 2.0,
        max_attempts: 2,
    }
}

/// Store configuration used by most tests
pub fn test_config() -> StoreConfig {
    StoreConfig {
        retry: fast_retry(),
        ..StoreConfig::default()
    }
}

/// Store with a manual clock at zero and one range spanning the keyspace.
pub fn create_test_store() -> (Store, ManualClock) {
    create_test_store_with(test_config(), Arc::new(NoopReplication::default()))
}

pub fn create_test_store_with(config: StoreConfig, replication: Arc<dyn Replication>) -> (Store, ManualClock) {
    let manual = ManualClock::new(0);
    let clock = Arc::new(HybridClock::manual(&manual));
    let engine = Arc::new(InMemEngine::new(1 << 20));
    let store = Store::new(1, clock, engine, replication, config).unwrap();
    store
        .add_range(RangeDescriptor::new(TEST_RANGE, Key::MIN, Limits::default().key_max()))
        .unwrap();
    (store, manual)
}

/// A pending transaction stamped by the store clock with no uncertainty
/// window.
pub fn new_transaction(store: &Store, key: &str, priority: i32, isolation: IsolationLevel) -> Transaction {
    let mut txn = Transaction::new("test", Key::from(key), 1, isolation, store.clock().now(), 0);
    txn.priority = priority;
    txn
}

/// A pending transaction whose uncertainty window spans the store clock's
/// maximum offset.
pub fn new_uncertain_transaction(store: &Store, key: &str, priority: i32, isolation: IsolationLevel) -> Transaction {
    let clock = store.clock();
    let mut txn = Transaction::new("test", Key::from(key), 1, isolation, clock.now(), clock.max_offset_nanos());
    txn.priority = priority;
    txn
}
