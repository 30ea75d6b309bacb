use bytes::Bytes;
use tracing::debug;
use tracing::warn;

use super::scope::scope;
use super::StoreAdapter;
use crate::storage::TxnOp;
use crate::Error;
use crate::Result;

/// Batch of writes applied atomically by [`Txn::commit`].
///
/// `put` and `delete` only record operations. Operations on the same key are
/// applied in the order they were added. A transaction is committed at most
/// once; after the first `commit`, successful or not, it is terminal.
#[derive(Debug)]
pub struct Txn {
    adapter: StoreAdapter,
    scope: String,
    ops: Vec<TxnOp>,
    invalid_key: Option<String>,
    committed: bool,
}

impl Txn {
    pub(crate) fn new(
        adapter: StoreAdapter,
        scope: String,
    ) -> Self {
        Self {
            adapter,
            scope,
            ops: Vec::new(),
            invalid_key: None,
            committed: false,
        }
    }

    pub fn put(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
    ) -> &mut Self {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.record(key, |key| TxnOp::Put { key, value })
    }

    pub fn delete(
        &mut self,
        key: &str,
    ) -> &mut Self {
        self.record(key, |key| TxnOp::Delete { key })
    }

    /// Number of recorded operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Applies every recorded operation in one backend transaction.
    ///
    /// # Errors
    /// - [`Error::AlreadyCommitted`] on any call after the first
    /// - [`Error::InvalidKey`] if an empty key was recorded; nothing is sent
    /// - [`Error::StoreUnavailable`] if the backend rejected the batch; no
    ///   operation took effect
    pub async fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(Error::AlreadyCommitted);
        }
        self.committed = true;
        self.adapter.ensure_open()?;

        if let Some(reason) = self.invalid_key.take() {
            self.ops.clear();
            return Err(Error::InvalidKey(reason));
        }

        if self.ops.is_empty() {
            debug!(scope = %self.scope, "empty transaction, nothing to commit");
            return Ok(());
        }

        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        let revision = self.adapter.txn(ops).await?;

        debug!(scope = %self.scope, ops = count, revision, "transaction committed");
        Ok(())
    }

    fn record(
        &mut self,
        key: &str,
        op: impl FnOnce(String) -> TxnOp,
    ) -> &mut Self {
        if self.committed {
            warn!(key, "transaction already committed, operation ignored");
            return self;
        }
        if key.is_empty() {
            self.invalid_key
                .get_or_insert_with(|| "transaction key must not be empty".to_string());
            return self;
        }

        self.ops.push(op(scope(&self.scope, key)));
        self
    }
}
