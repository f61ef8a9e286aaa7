//! Cancellable periodic background tasks
//!
//! The coordinator runs one heartbeat task per open transaction plus one
//! garbage-collection sweep. Each task owns a [`CancelToken`]; cancelling
//! it wakes the task immediately instead of waiting out the interval.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared cancellation flag with wake-up
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    /// A fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the task and wake it if it is sleeping
    pub fn cancel(&self) {
        *self.state.cancelled.lock() = true;
        self.state.wake.notify_all();
    }

    /// True once [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Sleep for `timeout` or until cancelled; returns true if cancelled
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self.state.wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Run `tick` every `interval` on a named thread until the token is
/// cancelled or `tick` returns false
pub fn spawn_periodic<F>(name: String, interval: Duration, token: CancelToken, mut tick: F) -> io::Result<JoinHandle<()>>
where
    F: FnMut() -> bool + Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        while !token.wait(interval) {
            if !tick() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wait_times_out_without_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let cancelled = token.wait(Duration::from_secs(30));
                (cancelled, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        let (cancelled, elapsed) = waiter.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn test_periodic_task_stops_on_cancel() {
        let token = CancelToken::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = {
            let ticks = ticks.clone();
            spawn_periodic("test-periodic".to_string(), Duration::from_millis(1), token.clone(), move || {
                ticks.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap()
        };
        while ticks.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        token.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_periodic_task_stops_when_tick_declines() {
        let handle = spawn_periodic("test-once".to_string(), Duration::from_millis(1), CancelToken::new(), || false)
            .unwrap();
        handle.join().unwrap();
    }
}
