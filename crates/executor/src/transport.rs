//! Node transport
//!
//! The transport maps node ids to something requests can be sent to. Only
//! the in-process directory exists here; a networked transport implements
//! the same trait.

use std::sync::Arc;

use dashmap::DashMap;
use strata_core::{NodeId, StrataError, StrataResult};
use tracing::debug;

use crate::command::Sender;

/// Directory of reachable nodes
pub trait Transport: Send + Sync {
    /// Make `sender` reachable as `node`
    fn listen(&self, node: NodeId, sender: Arc<dyn Sender>) -> StrataResult<()>;

    /// Connect to `node`
    fn connect(&self, node: NodeId) -> StrataResult<Arc<dyn Sender>>;

    /// Stop serving `node`
    fn stop(&self, node: NodeId);
}

/// In-process transport
#[derive(Default)]
pub struct LocalTransport {
    nodes: DashMap<NodeId, Arc<dyn Sender>>,
}

impl LocalTransport {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listening nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node listens
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Transport for LocalTransport {
    fn listen(&self, node: NodeId, sender: Arc<dyn Sender>) -> StrataResult<()> {
        if self.nodes.contains_key(&node) {
            return Err(StrataError::invalid_argument(format!("node {} is already listening", node)));
        }
        self.nodes.insert(node, sender);
        debug!(target: "strata::store", node = %node, "listening");
        Ok(())
    }

    fn connect(&self, node: NodeId) -> StrataResult<Arc<dyn Sender>> {
        self.nodes
            .get(&node)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StrataError::internal(format!("node {} unreachable", node)))
    }

    fn stop(&self, node: NodeId) {
        self.nodes.remove(&node);
    }
}
