//! Client-side transaction coordination for Strata
//!
//! [`TxnCoordSender`] sits in front of any [`Sender`](strata_executor::Sender)
//! and turns a stream of requests into managed transactions: it begins them,
//! keeps them alive with heartbeats, remembers which keys they touched,
//! rewrites conflict errors into the parameters of the next attempt, and
//! resolves intents once a transaction is over.
//!
//! # Modules
//!
//! - `coordinator`: the coordinator itself and its error translation
//! - `key_ranges`: minimal covering set of touched key intervals
//! - `heartbeat`: cancellable periodic tasks
//! - `config`: intervals and timeouts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod heartbeat;
pub mod key_ranges;

pub use config::{CoordinatorConfig, DEFAULT_CLIENT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS};
pub use coordinator::{TxnCoordSender, TxnState};
pub use heartbeat::{spawn_periodic, CancelToken};
pub use key_ranges::KeyRanges;
