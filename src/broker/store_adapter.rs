use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::constants::OP_CLOSE;
use crate::constants::OP_DELETE;
use crate::constants::OP_GET;
use crate::constants::OP_LIST;
use crate::constants::OP_PUT;
use crate::constants::OP_TXN;
use crate::constants::OP_WATCH;
use crate::metrics;
use crate::metrics::API_SLO;
use crate::storage::DeleteResponse;
use crate::storage::KeyValue;
use crate::storage::KvBackend;
use crate::storage::NativeWatchStream;
use crate::storage::RangeRequest;
use crate::storage::RangeResponse;
use crate::storage::TxnOp;
use crate::utils::ScopedTimer;
use crate::Error;
use crate::Result;
use crate::StorageError;
use crate::StorageResult;

/// Thin wrapper over the backend handle owned by a [`crate::Broker`].
///
/// Every call is bounded by the request timeout and raced against the
/// broker's shutdown token. Backend errors are wrapped with the operation
/// name through [`Error::from_storage`].
#[derive(Clone)]
pub(crate) struct StoreAdapter {
    backend: Arc<dyn KvBackend>,
    request_timeout: Duration,
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for StoreAdapter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("request_timeout", &self.request_timeout)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl StoreAdapter {
    pub(crate) fn new(
        backend: Arc<dyn KvBackend>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            request_timeout,
            shutdown: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the broker closes
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub(super) async fn call<T, F>(
        &self,
        op: &'static str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        self.ensure_open()?;
        let _timer = ScopedTimer::new(op);

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!(op, "call cancelled by close");
                return Err(Error::Closed);
            }
            outcome = tokio::time::timeout(self.request_timeout, fut) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => {
                metrics::record_op(op, true);
                Ok(value)
            }
            Ok(Err(e)) => {
                metrics::record_op(op, false);
                match &e {
                    StorageError::InvalidArgument(_) | StorageError::Compacted { .. } => {
                        warn!(op, error = %e, "backend rejected request")
                    }
                    _ => error!(op, error = %e, "backend call failed"),
                }
                Err(Error::from_storage(op, e))
            }
            Err(_elapsed) => {
                metrics::record_op(op, false);
                error!(op, timeout = ?self.request_timeout, "backend call timed out");
                Err(Error::StoreUnavailable {
                    op,
                    source: StorageError::Timeout(self.request_timeout),
                })
            }
        }
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        self.call(OP_PUT, self.backend.put(key, value, ttl)).await
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        self.call(OP_GET, self.backend.get(key)).await
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn delete(
        &self,
        key: &str,
        prefix: bool,
    ) -> Result<DeleteResponse> {
        self.call(OP_DELETE, self.backend.delete(key, prefix)).await
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn range(
        &self,
        request: RangeRequest,
    ) -> Result<RangeResponse> {
        self.call(OP_LIST, self.backend.range(request)).await
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn txn(
        &self,
        ops: Vec<TxnOp>,
    ) -> Result<u64> {
        self.call(OP_TXN, self.backend.txn(ops)).await
    }

    pub(crate) async fn watch(
        &self,
        prefix: &str,
    ) -> Result<NativeWatchStream> {
        self.call(OP_WATCH, self.backend.watch(prefix)).await
    }

    /// Cancels in-flight calls and releases the backend. Only the first call
    /// reaches the backend.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("adapter already closed");
            return Ok(());
        }
        self.shutdown.cancel();

        let _timer = ScopedTimer::new(OP_CLOSE);
        let result = match tokio::time::timeout(self.request_timeout, self.backend.close()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.request_timeout)),
        };
        metrics::record_op(OP_CLOSE, result.is_ok());

        match result {
            Ok(()) => {
                info!("backend connection released");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "backend close failed");
                Err(Error::StoreUnavailable {
                    op: OP_CLOSE,
                    source: e,
                })
            }
        }
    }

    /// Cancels in-flight calls without waiting for the backend
    pub(crate) fn abort(&self) {
        self.shutdown.cancel();
    }
}
