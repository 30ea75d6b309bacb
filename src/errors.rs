//! Broker Error Hierarchy
//!
//! Two layers of errors:
//! - [`StorageError`]: what the backend store reports about a single native call
//! - [`Error`]: what callers of the broker, its scoped views, transactions and
//!   watch subscriptions observe
//!
//! Backend failures are wrapped with the name of the broker operation that hit
//! them, never replaced, so callers keep the original cause.

use std::time::Duration;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty or malformed key on a write path
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Transport or backend failure. Retryable by the caller.
    #[error("Store unavailable during {op}: {source}")]
    StoreUnavailable {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    /// Operation attempted after the broker was closed
    #[error("Broker is closed")]
    Closed,

    /// `commit()` called on a transaction that was already committed
    #[error("Transaction already committed")]
    AlreadyCommitted,

    /// The native watch stream behind a subscription failed
    #[error("Watch stream for prefix {prefix:?} broken: {reason}")]
    WatchStreamBroken { prefix: String, reason: String },

    /// Events were dropped for a slow subscriber (drop-and-signal policy only)
    #[error("Watch subscriber lagged, {missed} event(s) dropped")]
    WatchLagged { missed: u64 },

    /// A paged listing outlived the history kept by the store
    #[error("Snapshot revision {requested} has been compacted (compacted up to {compacted})")]
    SnapshotCompacted { requested: u64, compacted: u64 },

    /// A key returned through a scoped view does not carry the view's prefix
    #[error("Key {key:?} does not start with scope prefix {prefix:?}")]
    ScopeViolation { key: String, prefix: String },

    /// Configuration source or parse failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Backend cannot be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),

    /// Backend connection was closed
    #[error("Backend connection closed")]
    Closed,

    /// Requested revision is older than the compaction point
    #[error("Revision {requested} compacted (compacted revision: {compacted})")]
    Compacted { requested: u64, compacted: u64 },

    /// Request rejected by the backend
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Whether retrying the same call later can succeed without caller changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. } | Error::WatchStreamBroken { .. }
        )
    }

    /// Attaches the broker operation name to a backend failure.
    ///
    /// Invalid arguments and compaction are surfaced as their own kinds so
    /// callers can tell them apart from connectivity problems.
    pub(crate) fn from_storage(
        op: &'static str,
        source: StorageError,
    ) -> Self {
        match source {
            StorageError::InvalidArgument(msg) => Error::InvalidKey(msg),
            StorageError::Compacted { requested, compacted } => {
                Error::SnapshotCompacted { requested, compacted }
            }
            source => Error::StoreUnavailable { op, source },
        }
    }
}
