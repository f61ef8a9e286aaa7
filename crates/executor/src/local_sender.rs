//! In-process request routing
//!
//! `LocalSender` dispatches each request to the store that serves its key
//! span and fills in the target range id.

use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::StrataError;

use crate::command::{Request, Response, Sender};
use crate::store::Store;

/// Router over the stores of this process
#[derive(Debug, Default)]
pub struct LocalSender {
    stores: RwLock<Vec<Arc<Store>>>,
}

impl LocalSender {
    /// Create a router with no stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests to `store` as well
    pub fn add_store(&self, store: Arc<Store>) {
        self.stores.write().push(store);
    }

    /// Number of stores
    pub fn store_count(&self) -> usize {
        self.stores.read().len()
    }

    /// The store serving `key`, if any
    pub fn store_for(&self, key: &strata_core::Key) -> Option<Arc<Store>> {
        self.stores
            .read()
            .iter()
            .find(|s| s.lookup_range(key).is_some())
            .cloned()
    }
}

impl Sender for LocalSender {
    fn send(&self, mut req: Request) -> Response {
        let target = {
            let stores = self.stores.read();
            stores.iter().find_map(|store| {
                store
                    .lookup_range(&req.header.key)
                    .filter(|range| range.desc().contains_span(&req.header.key, req.header.end()))
                    .map(|range| (Arc::clone(store), range.id()))
            })
        };
        match target {
            Some((store, range_id)) => {
                req.header.range_id = range_id;
                store.execute_cmd(req)
            }
            None => Response::err(
                req.header.timestamp,
                req.header.txn.clone(),
                StrataError::RangeKeyMismatch {
                    start: req.header.key.clone(),
                    end: req.header.end_key.clone(),
                    range_id: None,
                },
            ),
        }
    }
}
