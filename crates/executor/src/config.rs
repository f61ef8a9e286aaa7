//! Store configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::{Limits, RetryOptions};

/// Configuration of a [`Store`](crate::Store)
///
/// All fields have defaults, so a partial TOML table deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum tolerated clock offset between nodes (default: 250ms)
    pub max_offset_ms: u64,
    /// Inactivity after which a pending transaction may be aborted by any
    /// pusher (default: 10s, twice the default heartbeat interval)
    pub txn_expiration_ms: u64,
    /// Key size limits
    pub limits: Limits,
    /// Backoff for conflict retries
    pub retry: RetryOptions,
    /// Time a proposal may stay unapplied before it is proposed again
    /// (default: 1s)
    pub proposal_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_offset_ms: 250,
            txn_expiration_ms: 10_000,
            limits: Limits::default(),
            retry: RetryOptions::default(),
            proposal_timeout_ms: 1_000,
        }
    }
}

impl StoreConfig {
    /// Maximum clock offset
    pub fn max_offset(&self) -> Duration {
        Duration::from_millis(self.max_offset_ms)
    }

    /// Transaction expiration window
    pub fn txn_expiration(&self) -> Duration {
        Duration::from_millis(self.txn_expiration_ms)
    }

    /// Proposal re-propose timeout
    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }
}
