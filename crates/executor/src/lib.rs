//! # Strata Executor
//!
//! The command execution layer: every key-value operation reaches storage
//! through a [`Store`].
//!
//! - [`Request`]/[`Response`]: the request/response contract
//! - [`Sender`]: anything that executes requests (stores, routers, the
//!   transaction coordinator)
//! - [`Store`]: validation, clock bookkeeping, latching and conflict
//!   resolution by pushing
//! - [`Range`]: per-range execution of reads and atomic writes
//! - [`Replication`] / [`Transport`]: interfaces to the replication log and
//!   the node directory, with in-process implementations
//!
//! ## Request flow
//!
//! ```text
//! Sender::send(req)
//!   -> LocalSender      route by key span, set range id
//!   -> Store            verify keys, stamp clock, latch
//!   -> Range::read      (Get, Scan)
//!   -> Replication      (everything else) -> apply thread -> Range::apply
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod latch;
pub mod local_sender;
pub mod range;
pub mod replication;
pub mod store;
pub mod transport;

#[cfg(test)]
mod tests;

pub use command::{
    Method, Request, RequestBody, RequestHeader, Response, ResponseBody, ResponseHeader, Sender,
    DEFAULT_USER_PRIORITY,
};
pub use config::StoreConfig;
pub use latch::{LatchGuard, LatchManager};
pub use local_sender::LocalSender;
pub use range::{Range, RangeDescriptor};
pub use replication::{CommandId, NoopReplication, ReplicatedCommand, Replication};
pub use store::Store;
pub use transport::{LocalTransport, Transport};
