//! Shared utilities for the end-to-end suites.
//!
//! Import via `mod common;` from a test crate.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stratakv::{Config, HybridClock, LocalNode, ManualClock, Request, Response, Sender};

// ============================================================================
// Initialization
// ============================================================================

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Config with millisecond-scale retries
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.store.retry.backoff_ms = 1;
    config.store.retry.max_backoff_ms = 5;
    config.store.retry.max_attempts = 5;
    config
}

// ============================================================================
// TestNode
// ============================================================================

/// A local node driven by a manual clock
pub struct TestNode {
    pub node: LocalNode,
    pub manual: ManualClock,
}

impl TestNode {
    pub fn new(config: Config) -> Self {
        init_tracing();
        let manual = ManualClock::new(0);
        let node = LocalNode::with_clock(&config, Arc::new(HybridClock::manual(&manual)))
            .expect("failed to start node");
        TestNode { node, manual }
    }

    pub fn send(&self, req: Request) -> Response {
        self.node.send(req)
    }

    /// Send directly to the store, bypassing the coordinator
    pub fn send_to_store(&self, req: Request) -> Response {
        self.node.sender().send(req)
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Poll `cond` until it holds or `within` elapses
pub fn is_true_within(mut cond: impl FnMut() -> bool, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
