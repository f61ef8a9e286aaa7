//! StrataKV - transactional core of a distributed, timestamp-ordered KV store
//!
//! Clients talk to a [`TxnCoordSender`], which begins transactions, keeps
//! them alive and resolves their intents. Below it, a [`Store`] validates,
//! timestamps and executes each command against MVCC storage, pushing
//! conflicting transactions out of the way when it can.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratakv::{Config, IsolationLevel, LocalNode, Request, Sender, Transaction};
//!
//! let node = LocalNode::start(&Config::default())?;
//!
//! // The first request of an unstarted transaction begins it
//! let txn = Transaction::unstarted("example", IsolationLevel::Serializable);
//! let resp = node.send(Request::put("user:123", "Alice").with_txn(&txn));
//! let txn = resp.header.txn.unwrap();
//!
//! node.send(Request::end_transaction(&txn, true)).into_result()?;
//! ```
//!
//! # Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `strata-core` | keys, timestamps, clock, transaction records, errors |
//! | `strata-storage` | engine contract, in-memory engine, write buffer |
//! | `strata-concurrency` | MVCC reads and writes, intents, push decisions |
//! | `strata-executor` | request contract, store, latches, replication |
//! | `strata-kv` | transaction coordinator |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod node;

pub use config::Config;
pub use node::{LocalNode, DEFAULT_ENGINE_CAPACITY, FIRST_NODE_ID, FIRST_RANGE_ID};

pub use strata_core::{
    HybridClock, IsolationLevel, Key, KeyRange, ManualClock, NodeId, RangeId, StrataError, StrataResult, Timestamp,
    Transaction, TransactionStatus, TxnId,
};
pub use strata_executor::{
    LocalSender, LocalTransport, Method, Request, Response, ResponseBody, Sender, Store, StoreConfig, Transport,
};
pub use strata_kv::{CoordinatorConfig, TxnCoordSender};
pub use strata_storage::{Engine, InMemEngine, WriteBuffer};
