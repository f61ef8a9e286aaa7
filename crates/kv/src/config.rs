//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between transaction heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Default inactivity after which the coordinator forgets a transaction
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 10_000;

/// Configuration of a [`TxnCoordSender`](crate::TxnCoordSender)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Interval between heartbeats of each open transaction (default: 5s)
    pub heartbeat_interval_ms: u64,
    /// Inactivity after which a transaction's local state is dropped
    /// (default: 10s)
    pub client_timeout_ms: u64,
    /// Interval of the garbage-collection sweep; the heartbeat interval
    /// when unset
    pub gc_interval_ms: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            client_timeout_ms: DEFAULT_CLIENT_TIMEOUT_MS,
            gc_interval_ms: None,
        }
    }
}

impl CoordinatorConfig {
    /// Heartbeat interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Client inactivity timeout
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    /// Garbage-collection sweep interval
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms.unwrap_or(self.heartbeat_interval_ms))
    }
}
