//! Request and response types for key-value commands
//!
//! Every operation that reaches a store is a [`Request`]: a header naming
//! the key span, timestamp and (optional) transaction, plus a method-specific
//! [`RequestBody`]. Every request yields exactly one [`Response`], whose
//! header carries the timestamp the command executed at, the updated
//! transaction (if any) and the error (if any).
//!
//! Requests are:
//! - **Self-contained**: everything needed for execution is in the request
//! - **Serializable**: they travel through replication as data
//! - **Typed**: one body variant per method, no generic fallback

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{Key, KeyRange, RangeId, StrataError, StrataResult, Timestamp, Transaction};

/// Method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Read one key
    Get,
    /// Write one key
    Put,
    /// Delete one key
    Delete,
    /// Add to an integer value
    Increment,
    /// Read a key span
    Scan,
    /// Commit or abort a transaction
    EndTransaction,
    /// Refresh a transaction's liveness
    HeartbeatTxn,
    /// Push a conflicting transaction
    PushTxn,
    /// Resolve a transaction's intents on a key or span
    ResolveIntent,
}

impl Method {
    /// True for methods that only read user data
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Scan)
    }

    /// True for methods that mutate state and go through replication
    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    /// True for methods the coordinator issues on its own behalf
    pub fn is_internal(&self) -> bool {
        matches!(self, Method::HeartbeatTxn | Method::PushTxn | Method::ResolveIntent)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "Get",
            Method::Put => "Put",
            Method::Delete => "Delete",
            Method::Increment => "Increment",
            Method::Scan => "Scan",
            Method::EndTransaction => "EndTransaction",
            Method::HeartbeatTxn => "HeartbeatTxn",
            Method::PushTxn => "PushTxn",
            Method::ResolveIntent => "ResolveIntent",
        };
        f.write_str(name)
    }
}

/// Default user priority of a request
pub const DEFAULT_USER_PRIORITY: i32 = 1;

/// Common request fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Key (start key for span methods)
    pub key: Key,
    /// Exclusive end key for span methods; empty for point methods
    pub end_key: Key,
    /// Execution timestamp; zero means "stamp with the store clock"
    pub timestamp: Timestamp,
    /// Transaction the request runs in, if any
    pub txn: Option<Transaction>,
    /// User priority for non-transactional conflict resolution
    pub user_priority: i32,
    /// Target range; filled in by routing
    pub range_id: RangeId,
}

impl RequestHeader {
    /// Header for a point request at `key`
    pub fn new(key: impl Into<Key>) -> Self {
        RequestHeader {
            key: key.into(),
            end_key: Key::MIN,
            timestamp: Timestamp::ZERO,
            txn: None,
            user_priority: DEFAULT_USER_PRIORITY,
            range_id: RangeId::default(),
        }
    }

    /// The end key, or `None` for point requests
    pub fn end(&self) -> Option<&Key> {
        if self.end_key.is_empty() {
            None
        } else {
            Some(&self.end_key)
        }
    }

    /// The key interval the request addresses
    pub fn span(&self) -> KeyRange {
        KeyRange::from_span(&self.key, self.end())
    }
}

/// Method-specific request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Read `header.key`
    Get,
    /// Write `value` to `header.key`
    Put {
        /// Value bytes
        value: Vec<u8>,
    },
    /// Delete `header.key`
    Delete,
    /// Add `delta` to the integer at `header.key`
    Increment {
        /// Amount to add; zero only reads
        delta: i64,
    },
    /// Read `[header.key, header.end_key)`
    Scan {
        /// Result limit; zero means unlimited
        max_results: usize,
    },
    /// Finish `header.txn`
    EndTransaction {
        /// Commit when true, abort otherwise
        commit: bool,
    },
    /// Refresh `header.txn`'s heartbeat
    HeartbeatTxn,
    /// Push `pushee` on behalf of `header.txn` (or a non-transactional caller)
    PushTxn {
        /// Transaction to push
        pushee: Transaction,
        /// Abort instead of moving the timestamp
        abort: bool,
    },
    /// Resolve `header.txn`'s intents on `header.key` (or the span)
    ResolveIntent,
}

/// A command addressed to a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Common fields
    pub header: RequestHeader,
    /// Method arguments
    pub body: RequestBody,
}

impl Request {
    /// Build a request from a header and body
    pub fn new(header: RequestHeader, body: RequestBody) -> Self {
        Request { header, body }
    }

    /// Point read
    pub fn get(key: impl Into<Key>) -> Self {
        Request::new(RequestHeader::new(key), RequestBody::Get)
    }

    /// Point write
    pub fn put(key: impl Into<Key>, value: impl Into<Vec<u8>>) -> Self {
        Request::new(RequestHeader::new(key), RequestBody::Put { value: value.into() })
    }

    /// Point delete
    pub fn delete(key: impl Into<Key>) -> Self {
        Request::new(RequestHeader::new(key), RequestBody::Delete)
    }

    /// Counter increment
    pub fn increment(key: impl Into<Key>, delta: i64) -> Self {
        Request::new(RequestHeader::new(key), RequestBody::Increment { delta })
    }

    /// Span read
    pub fn scan(start: impl Into<Key>, end: impl Into<Key>, max_results: usize) -> Self {
        let mut header = RequestHeader::new(start);
        header.end_key = end.into();
        Request::new(header, RequestBody::Scan { max_results })
    }

    /// Finish `txn`; addressed to its base key
    pub fn end_transaction(txn: &Transaction, commit: bool) -> Self {
        Request::new(RequestHeader::new(txn.key.clone()), RequestBody::EndTransaction { commit }).with_txn(txn)
    }

    /// Heartbeat `txn`; addressed to its base key
    pub fn heartbeat(txn: &Transaction) -> Self {
        Request::new(RequestHeader::new(txn.key.clone()), RequestBody::HeartbeatTxn).with_txn(txn)
    }

    /// Push `pushee`; addressed to its base key
    pub fn push_txn(pushee: &Transaction, abort: bool) -> Self {
        Request::new(
            RequestHeader::new(pushee.key.clone()),
            RequestBody::PushTxn {
                pushee: pushee.clone(),
                abort,
            },
        )
    }

    /// Resolve `txn`'s intents on `span`
    pub fn resolve_intent(txn: &Transaction, span: &KeyRange) -> Self {
        let mut header = RequestHeader::new(span.start.clone());
        if !span.is_point() {
            header.end_key = span.end.clone();
        }
        Request::new(header, RequestBody::ResolveIntent).with_txn(txn)
    }

    /// Attach a transaction
    pub fn with_txn(mut self, txn: &Transaction) -> Self {
        self.header.txn = Some(txn.clone());
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, ts: Timestamp) -> Self {
        self.header.timestamp = ts;
        self
    }

    /// Set the user priority
    pub fn with_user_priority(mut self, priority: i32) -> Self {
        self.header.user_priority = priority;
        self
    }

    /// Set the target range
    pub fn with_range(mut self, range_id: RangeId) -> Self {
        self.header.range_id = range_id;
        self
    }

    /// The request's method
    pub fn method(&self) -> Method {
        match self.body {
            RequestBody::Get => Method::Get,
            RequestBody::Put { .. } => Method::Put,
            RequestBody::Delete => Method::Delete,
            RequestBody::Increment { .. } => Method::Increment,
            RequestBody::Scan { .. } => Method::Scan,
            RequestBody::EndTransaction { .. } => Method::EndTransaction,
            RequestBody::HeartbeatTxn => Method::HeartbeatTxn,
            RequestBody::PushTxn { .. } => Method::PushTxn,
            RequestBody::ResolveIntent => Method::ResolveIntent,
        }
    }
}

/// Method-specific results
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Value read, if any
    Get {
        /// Value bytes
        value: Option<Vec<u8>>,
    },
    /// Write applied
    Put,
    /// Delete applied
    Delete,
    /// Value after the increment
    Increment {
        /// New counter value
        new_value: i64,
    },
    /// Rows read, in key order
    Scan {
        /// Key/value pairs
        rows: Vec<(Key, Vec<u8>)>,
    },
    /// Transaction finished; the record is in the response header
    EndTransaction,
    /// Heartbeat recorded; the record is in the response header
    HeartbeatTxn,
    /// Push succeeded
    PushTxn {
        /// Pushee record after the push
        pushee: Transaction,
    },
    /// Intents resolved
    ResolveIntent,
}

/// Common response fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeader {
    /// Timestamp the command executed at
    pub timestamp: Timestamp,
    /// Updated transaction, if the request carried or produced one
    pub txn: Option<Transaction>,
    /// Failure, if any
    pub error: Option<StrataError>,
}

/// Result of executing a [`Request`]
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Common fields
    pub header: ResponseHeader,
    /// Method result; `None` when `header.error` is set
    pub body: Option<ResponseBody>,
}

impl Response {
    /// A successful response
    pub fn ok(timestamp: Timestamp, txn: Option<Transaction>, body: ResponseBody) -> Self {
        Response {
            header: ResponseHeader {
                timestamp,
                txn,
                error: None,
            },
            body: Some(body),
        }
    }

    /// A failed response
    pub fn err(timestamp: Timestamp, txn: Option<Transaction>, error: StrataError) -> Self {
        Response {
            header: ResponseHeader {
                timestamp,
                txn,
                error: Some(error),
            },
            body: None,
        }
    }

    /// A failed response with no timestamp or transaction
    pub fn from_error(error: StrataError) -> Self {
        Response::err(Timestamp::ZERO, None, error)
    }

    /// The error, if any
    pub fn error(&self) -> Option<&StrataError> {
        self.header.error.as_ref()
    }

    /// True when the response carries no error
    pub fn is_ok(&self) -> bool {
        self.header.error.is_none()
    }

    /// The body, or the error
    pub fn into_result(self) -> StrataResult<ResponseBody> {
        match (self.header.error, self.body) {
            (Some(err), _) => Err(err),
            (None, Some(body)) => Ok(body),
            (None, None) => Err(StrataError::internal("response carries neither body nor error")),
        }
    }
}

/// Anything that can execute requests
///
/// Implemented by stores, routers and the transaction coordinator, which
/// wraps another sender.
pub trait Sender: Send + Sync {
    /// Execute `req` and return its response
    fn send(&self, req: Request) -> Response;
}
