use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::scope::scope;
use super::scope::unscope_owned;
use super::BytesBroker;
use super::KeyIterator;
use super::KvIterator;
use super::PluginBroker;
use super::StoreAdapter;
use super::Txn;
use crate::config::BrokerConfig;
use crate::storage::KeyValue;
use crate::storage::KvBackend;
use crate::watch::WatchHandle;
use crate::watch::WatchRegistry;
use crate::watch::WatchResult;
use crate::watch::WatchSubscription;
use crate::Error;
use crate::Result;

/// State shared by a [`Broker`] and every view derived from it.
///
/// Each operation takes the scope prefix of the caller: empty for the broker
/// itself, the bound prefix for a [`PluginBroker`].
#[derive(Debug)]
pub(crate) struct BrokerInner {
    pub(crate) adapter: StoreAdapter,
    pub(crate) watches: WatchRegistry,
    pub(crate) config: BrokerConfig,
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

impl BrokerInner {
    pub(crate) async fn put(
        &self,
        prefix: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<()> {
        validate_key(key)?;
        let key = scope(prefix, key);
        let revision = self.adapter.put(&key, value, ttl).await?;
        debug!(key = %key, revision, "put");
        Ok(())
    }

    pub(crate) async fn get(
        &self,
        prefix: &str,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        match self.adapter.get(&scope(prefix, key)).await? {
            Some(mut kv) => {
                kv.key = unscope_owned(prefix, kv.key)?;
                Ok(Some(kv))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn delete(
        &self,
        prefix: &str,
        key: &str,
    ) -> Result<bool> {
        validate_key(key)?;
        let key = scope(prefix, key);
        let response = self.adapter.delete(&key, false).await?;
        debug!(key = %key, deleted = response.deleted, revision = response.revision, "delete");
        Ok(response.deleted > 0)
    }

    pub(crate) async fn delete_prefix(
        &self,
        prefix: &str,
        key_prefix: &str,
    ) -> Result<u64> {
        let key_prefix = scope(prefix, key_prefix);
        let response = self.adapter.delete(&key_prefix, true).await?;
        debug!(prefix = %key_prefix, deleted = response.deleted, revision = response.revision, "delete prefix");
        Ok(response.deleted)
    }

    pub(crate) async fn list(
        &self,
        prefix: &str,
        key_prefix: &str,
        keys_only: bool,
    ) -> Result<KvIterator> {
        KvIterator::open(
            self.adapter.clone(),
            scope(prefix, key_prefix),
            prefix.to_string(),
            self.config.list_page_size,
            keys_only,
        )
        .await
    }

    pub(crate) async fn watch(
        &self,
        prefix: &str,
        sender: mpsc::Sender<WatchResult>,
        key_prefix: &str,
    ) -> Result<WatchHandle> {
        self.adapter.ensure_open()?;
        self.watches
            .register(
                &self.adapter,
                scope(prefix, key_prefix),
                prefix.to_string(),
                key_prefix.to_string(),
                sender,
            )
            .await
    }

    pub(crate) async fn subscribe(
        &self,
        prefix: &str,
        key_prefix: &str,
    ) -> Result<WatchSubscription> {
        let (sender, receiver) = mpsc::channel(self.config.watch.watcher_buffer_size);
        let handle = self.watch(prefix, sender, key_prefix).await?;
        Ok(WatchSubscription::new(receiver, handle))
    }

    pub(crate) fn new_txn(
        &self,
        prefix: &str,
    ) -> Txn {
        Txn::new(self.adapter.clone(), prefix.to_string())
    }
}

/// Byte-oriented client of a consistent key-value store.
///
/// Owns the single backend handle. Scoped views created with
/// [`Broker::new_plugin_broker`] share it and stop working once the broker is
/// closed.
///
/// # Example
/// ```ignore
/// let broker = Broker::new(Arc::new(MemKvBackend::new()), BrokerConfig::default())?;
/// broker.put("greeting", b"hello").await?;
/// let plugin = broker.new_plugin_broker("/my/prefix/");
/// plugin.put("vals/val1", b"1").await?;
/// broker.close().await?;
/// ```
#[derive(Debug)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Validates `config` and wraps `backend`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the configuration is rejected by
    /// [`BrokerConfig::validate`].
    pub fn new(
        backend: Arc<dyn KvBackend>,
        config: BrokerConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        let adapter = StoreAdapter::new(backend, config.request_timeout());
        let watches = WatchRegistry::new(
            config.watch.slow_subscriber_policy,
            adapter.shutdown_token(),
        );
        info!(?config, "broker created");

        Ok(Self {
            inner: Arc::new(BrokerInner {
                adapter,
                watches,
                config,
            }),
        })
    }

    /// Scoped view whose keys live under `prefix`
    pub fn new_plugin_broker(
        &self,
        prefix: &str,
    ) -> PluginBroker {
        PluginBroker::new(prefix.to_string(), Arc::clone(&self.inner))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.adapter.is_closed()
    }

    /// Number of native watch streams held open for subscribers
    pub fn active_watch_streams(&self) -> usize {
        self.inner.watches.stream_count()
    }

    /// Releases the backend.
    ///
    /// In-flight calls return [`Error::Closed`], every watch subscription ends
    /// and its channel closes. Later calls on the broker or any view derived
    /// from it fail with [`Error::Closed`]. Calling `close` again is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.inner.adapter.close().await?;
        info!("broker closed");
        Ok(())
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if !self.inner.adapter.is_closed() {
            warn!("broker dropped without close(), cancelling outstanding work");
            self.inner.adapter.abort();
        }
    }
}

#[async_trait]
impl BytesBroker for Broker {
    async fn put(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
    ) -> Result<()> {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.inner.put("", key, value, None).await
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
        ttl: Duration,
    ) -> Result<()> {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.inner.put("", key, value, Some(ttl)).await
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        self.inner.get("", key).await
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        self.inner.delete("", key).await
    }

    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<u64> {
        self.inner.delete_prefix("", prefix).await
    }

    async fn list_values(
        &self,
        prefix: &str,
    ) -> Result<KvIterator> {
        self.inner.list("", prefix, false).await
    }

    async fn list_keys(
        &self,
        prefix: &str,
    ) -> Result<KeyIterator> {
        Ok(KeyIterator::new(self.inner.list("", prefix, true).await?))
    }

    async fn watch(
        &self,
        sender: mpsc::Sender<WatchResult>,
        prefix: &str,
    ) -> Result<WatchHandle> {
        self.inner.watch("", sender, prefix).await
    }

    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<WatchSubscription> {
        self.inner.subscribe("", prefix).await
    }

    fn new_txn(&self) -> Txn {
        self.inner.new_txn("")
    }
}
