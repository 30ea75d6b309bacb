use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::kv_broker::BrokerInner;
use super::scope::scope;
use super::BytesBroker;
use super::KeyIterator;
use super::KvIterator;
use super::Txn;
use crate::storage::KeyValue;
use crate::watch::WatchHandle;
use crate::watch::WatchResult;
use crate::watch::WatchSubscription;
use crate::Result;

/// View of a [`crate::Broker`] restricted to the keys under one prefix.
///
/// Keys passed in are local: the bound prefix is prepended before they reach
/// the store and stripped from keys handed back. Views are cheap to clone and
/// cannot close the broker they come from.
#[derive(Debug, Clone)]
pub struct PluginBroker {
    prefix: String,
    inner: Arc<BrokerInner>,
}

impl PluginBroker {
    pub(crate) fn new(
        prefix: String,
        inner: Arc<BrokerInner>,
    ) -> Self {
        Self { prefix, inner }
    }

    /// Bound prefix in the full keyspace
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Nested view bound to `self.prefix() + prefix`
    pub fn new_plugin_broker(
        &self,
        prefix: &str,
    ) -> PluginBroker {
        PluginBroker::new(scope(&self.prefix, prefix), Arc::clone(&self.inner))
    }
}

#[async_trait]
impl BytesBroker for PluginBroker {
    async fn put(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
    ) -> Result<()> {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.inner.put(&self.prefix, key, value, None).await
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
        ttl: Duration,
    ) -> Result<()> {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.inner.put(&self.prefix, key, value, Some(ttl)).await
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        self.inner.get(&self.prefix, key).await
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        self.inner.delete(&self.prefix, key).await
    }

    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<u64> {
        self.inner.delete_prefix(&self.prefix, prefix).await
    }

    async fn list_values(
        &self,
        prefix: &str,
    ) -> Result<KvIterator> {
        self.inner.list(&self.prefix, prefix, false).await
    }

    async fn list_keys(
        &self,
        prefix: &str,
    ) -> Result<KeyIterator> {
        Ok(KeyIterator::new(self.inner.list(&self.prefix, prefix, true).await?))
    }

    async fn watch(
        &self,
        sender: mpsc::Sender<WatchResult>,
        prefix: &str,
    ) -> Result<WatchHandle> {
        self.inner.watch(&self.prefix, sender, prefix).await
    }

    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<WatchSubscription> {
        self.inner.subscribe(&self.prefix, prefix).await
    }

    fn new_txn(&self) -> Txn {
        self.inner.new_txn(&self.prefix)
    }
}
