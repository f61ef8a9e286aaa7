//! Single-process node wiring
//!
//! A [`LocalNode`] assembles the pieces a client needs: one clock, one
//! in-memory engine, a store serving the whole keyspace and a router over
//! it. The router listens on a transport under the node's id, and the
//! transaction coordinator reaches it by connecting through that transport.
//!
//! ```text
//! client ──▶ TxnCoordSender ──▶ Transport ──▶ LocalSender ──▶ Store ──▶ InMemEngine
//! ```

use std::sync::Arc;

use strata_core::{HybridClock, Key, NodeId, RangeId, StrataResult};
use strata_executor::{
    LocalSender, LocalTransport, NoopReplication, RangeDescriptor, Request, Response, Sender, Store, Transport,
};
use strata_kv::TxnCoordSender;
use strata_storage::InMemEngine;
use tracing::info;

use crate::config::Config;

/// Engine capacity reported by a node's in-memory engine
pub const DEFAULT_ENGINE_CAPACITY: u64 = 1 << 30;

/// Id of the range a fresh node serves
pub const FIRST_RANGE_ID: RangeId = RangeId(1);

/// Id a node listens under when it owns its transport
pub const FIRST_NODE_ID: NodeId = NodeId(1);

/// A store, its router and a coordinator sharing one clock
pub struct LocalNode {
    id: NodeId,
    clock: Arc<HybridClock>,
    store: Arc<Store>,
    sender: Arc<LocalSender>,
    transport: Arc<dyn Transport>,
    coordinator: TxnCoordSender,
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNode")
            .field("node_id", &self.id)
            .field("store_id", &self.store.id())
            .field("open_txns", &self.coordinator.txn_count())
            .finish()
    }
}

impl LocalNode {
    /// Start a node on the system clock
    pub fn start(config: &Config) -> StrataResult<Self> {
        Self::with_clock(config, Arc::new(HybridClock::system()))
    }

    /// Start a node on the given clock with a transport of its own
    pub fn with_clock(config: &Config, clock: Arc<HybridClock>) -> StrataResult<Self> {
        Self::with_transport(config, clock, Arc::new(LocalTransport::new()), FIRST_NODE_ID)
    }

    /// Start a node that listens on `transport` as `id`
    ///
    /// # Errors
    ///
    /// Fails if `id` is already listening on `transport`, or if the store or
    /// the coordinator cannot start their background threads.
    pub fn with_transport(
        config: &Config,
        clock: Arc<HybridClock>,
        transport: Arc<dyn Transport>,
        id: NodeId,
    ) -> StrataResult<Self> {
        let store = Store::new(
            1,
            Arc::clone(&clock),
            Arc::new(InMemEngine::new(DEFAULT_ENGINE_CAPACITY)),
            Arc::new(NoopReplication::default()),
            config.store.clone(),
        )?;
        store.add_range(RangeDescriptor::new(
            FIRST_RANGE_ID,
            Key::MIN,
            config.store.limits.key_max(),
        ))?;
        let store = Arc::new(store);

        let sender = Arc::new(LocalSender::new());
        sender.add_store(Arc::clone(&store));
        if let Err(e) = transport.listen(id, Arc::clone(&sender) as Arc<dyn Sender>) {
            store.stop();
            return Err(e);
        }
        let coordinator = transport
            .connect(id)
            .and_then(|wrapped| TxnCoordSender::new(wrapped, Arc::clone(&clock), config.coordinator.clone()));
        let coordinator = match coordinator {
            Ok(coordinator) => coordinator,
            Err(e) => {
                transport.stop(id);
                store.stop();
                return Err(e);
            }
        };
        info!(target: "strata::store", node = %id, store_id = store.id(), "local node started");
        Ok(LocalNode {
            id,
            clock,
            store,
            sender,
            transport,
            coordinator,
        })
    }

    /// Id the node listens under
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Transport the node listens on
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The node's clock
    pub fn clock(&self) -> &Arc<HybridClock> {
        &self.clock
    }

    /// The node's only store
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Router below the coordinator
    pub fn sender(&self) -> &Arc<LocalSender> {
        &self.sender
    }

    /// Transaction coordinator
    pub fn coordinator(&self) -> &TxnCoordSender {
        &self.coordinator
    }

    /// Stop the coordinator, leave the transport, then stop the store
    pub fn close(&self) {
        self.coordinator.close();
        self.transport.stop(self.id);
        self.store.stop();
    }
}

impl Sender for LocalNode {
    fn send(&self, req: Request) -> Response {
        self.coordinator.send(req)
    }
}

impl Drop for LocalNode {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ManualClock;
    use strata_executor::ResponseBody;

    #[test]
    fn test_node_serves_requests() {
        let manual = ManualClock::new(0);
        let node = LocalNode::with_clock(&Config::default(), Arc::new(HybridClock::manual(&manual))).unwrap();

        assert!(node.send(Request::put("a", "1")).is_ok());
        let resp = node.send(Request::get("a"));
        assert_eq!(
            resp.into_result().unwrap(),
            ResponseBody::Get {
                value: Some(b"1".to_vec())
            }
        );
        assert_eq!(node.sender().store_count(), 1);
    }

    #[test]
    fn test_config_reaches_the_clock() {
        let mut config = Config::default();
        config.store.max_offset_ms = 3;
        let manual = ManualClock::new(0);
        let node = LocalNode::with_clock(&config, Arc::new(HybridClock::manual(&manual))).unwrap();
        assert_eq!(node.clock().max_offset_nanos(), 3_000_000);
    }

    #[test]
    fn test_close_stops_the_store() {
        let node = LocalNode::start(&Config::default()).unwrap();
        node.close();
        assert!(node.store().is_stopped());
        assert!(!node.send(Request::put("a", "1")).is_ok());
        assert!(node.transport().connect(node.id()).is_err());
    }

    #[test]
    fn test_nodes_share_a_transport() {
        let manual = ManualClock::new(0);
        let clock = Arc::new(HybridClock::manual(&manual));
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new());
        let config = Config::default();

        let first = LocalNode::with_transport(&config, Arc::clone(&clock), Arc::clone(&transport), NodeId(1)).unwrap();
        let second = LocalNode::with_transport(&config, Arc::clone(&clock), Arc::clone(&transport), NodeId(2)).unwrap();
        assert!(LocalNode::with_transport(&config, Arc::clone(&clock), Arc::clone(&transport), NodeId(2)).is_err());

        assert!(first.send(Request::put("a", "1")).is_ok());
        let resp = transport.connect(NodeId(1)).unwrap().send(Request::get("a"));
        assert_eq!(
            resp.into_result().unwrap(),
            ResponseBody::Get {
                value: Some(b"1".to_vec())
            }
        );
        let resp = transport.connect(NodeId(2)).unwrap().send(Request::get("a"));
        assert_eq!(resp.into_result().unwrap(), ResponseBody::Get { value: None });

        second.close();
        assert!(transport.connect(NodeId(2)).is_err());
        assert!(transport.connect(NodeId(1)).is_ok());
    }
}
