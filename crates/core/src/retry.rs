//! Bounded exponential backoff
//!
//! Used by the store when a conflict has to be resolved by pushing another
//! transaction: some outcomes allow an immediate retry, others wait with a
//! growing delay, and a hard cap on attempts bounds the whole loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Initial backoff in milliseconds (default: 50)
    pub backoff_ms: u64,
    /// Upper bound for a single wait in milliseconds (default: 5000)
    pub max_backoff_ms: u64,
    /// Multiplicative growth factor (default: 2)
    pub constant: f64,
    /// Maximum number of attempts, 0 for unbounded (default: 10)
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            backoff_ms: 50,
            max_backoff_ms: 5000,
            constant: 2.0,
            max_attempts: 10,
        }
    }
}

impl RetryOptions {
    /// Initial backoff
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Backoff cap
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// What the retried closure wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    /// Stop retrying
    Break,
    /// Retry immediately and reset the backoff
    Reset,
    /// Wait for the current backoff, then retry
    Continue,
}

/// The attempt cap was reached without the closure returning `Break`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("retry attempts exhausted after {attempts} attempts")]
pub struct MaxAttemptsExceeded {
    /// Number of attempts made
    pub attempts: u32,
}

/// Run `f` until it returns `Break` or the attempt cap is hit
///
/// `f` receives the 1-based attempt number. Every invocation counts toward
/// `max_attempts`, including ones that returned `Reset`.
pub fn retry_with_backoff<F>(opts: &RetryOptions, mut f: F) -> Result<(), MaxAttemptsExceeded>
where
    F: FnMut(u32) -> RetryStatus,
{
    let mut backoff = opts.backoff();
    let max_backoff = opts.max_backoff();
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let status = f(attempt);
        if status == RetryStatus::Break {
            return Ok(());
        }
        if opts.max_attempts > 0 && attempt >= opts.max_attempts {
            return Err(MaxAttemptsExceeded { attempts: attempt });
        }
        if status == RetryStatus::Reset {
            backoff = opts.backoff();
        } else {
            trace!(target: "strata::store", attempt, backoff_ms = backoff.as_millis() as u64, "backing off");
            std::thread::sleep(backoff);
            backoff = backoff.mul_f64(opts.constant.max(1.0)).min(max_backoff);
        }
    }
}
