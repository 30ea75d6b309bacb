//! Contract of the external consistent key-value store.
//!
//! The broker never talks to a store directly; it consumes this trait. A real
//! deployment plugs in a native client for its store; [`super::MemKvBackend`]
//! implements the same contract in-process.
//!
//! The trait is object safe so the broker can hold `Arc<dyn KvBackend>`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::StorageResult;

/// Key-value record with its modification revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
    /// Store revision of the last modification of this key
    pub revision: u64,
}

impl KeyValue {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Event type for watch notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventType {
    /// Key was inserted or updated
    Put,
    /// Key was deleted, explicitly or by TTL expiry
    Delete,
}

impl WatchEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventType::Put => "put",
            WatchEventType::Delete => "delete",
        }
    }
}

/// Watch event containing key change information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    /// The key that changed
    pub key: String,
    /// The new value (empty for DELETE events)
    pub value: Bytes,
    /// Value before this change, if the key existed
    pub prev_value: Option<Bytes>,
    /// Revision at which the change was committed
    pub revision: u64,
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_put(&self) -> bool {
        self.event_type == WatchEventType::Put
    }

    pub fn is_delete(&self) -> bool {
        self.event_type == WatchEventType::Delete
    }
}

/// Single write inside an atomic transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Bytes },
    Delete { key: String },
}

impl TxnOp {
    pub fn key(&self) -> &str {
        match self {
            TxnOp::Put { key, .. } | TxnOp::Delete { key } => key,
        }
    }
}

/// Prefix scan request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    /// Only keys starting with this prefix are returned
    pub prefix: String,
    /// Resume strictly after this key
    pub start_after: Option<String>,
    /// Maximum number of pairs to return. 0 means no limit.
    pub limit: usize,
    /// Snapshot revision to read at; `None` reads the current revision
    pub revision: Option<u64>,
    /// Return keys with empty values
    pub keys_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    /// Matching pairs in ascending key order
    pub kvs: Vec<KeyValue>,
    /// More pairs exist past the last returned key
    pub more: bool,
    /// Revision the scan was served at
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResponse {
    /// Number of keys removed
    pub deleted: u64,
    /// Store revision after the call
    pub revision: u64,
}

/// Server-streamed change events for one watched prefix.
///
/// The stream yields `Err` once and ends when the connection is lost.
/// Dropping it cancels the native watch.
pub type NativeWatchStream = BoxStream<'static, StorageResult<WatchEvent>>;

/// Native client of a linearizable, revisioned key-value store
///
/// # Consistency Guarantees
///
/// - writes are linearizable and each commit gets a strictly increasing revision
/// - `txn` applies all operations at one revision, or none
/// - watch streams deliver events in commit order
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`, safe for concurrent access.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Upserts `key`, returns the commit revision
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> StorageResult<u64>;

    /// Reads the latest value of `key`
    async fn get(
        &self,
        key: &str,
    ) -> StorageResult<Option<KeyValue>>;

    /// Deletes `key`, or every key starting with `key` when `prefix` is set
    async fn delete(
        &self,
        key: &str,
        prefix: bool,
    ) -> StorageResult<DeleteResponse>;

    /// Prefix scan, optionally pinned to a snapshot revision
    async fn range(
        &self,
        request: RangeRequest,
    ) -> StorageResult<RangeResponse>;

    /// Applies all operations atomically, returns the commit revision
    async fn txn(
        &self,
        ops: Vec<TxnOp>,
    ) -> StorageResult<u64>;

    /// Opens a change stream for every key starting with `prefix`
    async fn watch(
        &self,
        prefix: &str,
    ) -> StorageResult<NativeWatchStream>;

    /// Releases the connection and ends all open watch streams
    async fn close(&self) -> StorageResult<()>;
}
