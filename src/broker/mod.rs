//! Byte-oriented broker API over a [`crate::KvBackend`]
//!
//! [`Broker`] owns the backend handle; [`PluginBroker`] is a prefix-scoped
//! view of it. Both expose the same operations through [`BytesBroker`].

mod iterator;
mod kv_broker;
mod plugin_broker;
mod scope;
mod store_adapter;
mod txn;

pub use iterator::*;
pub use kv_broker::Broker;
pub use plugin_broker::*;
pub use scope::scope;
pub use scope::unscope;
pub use txn::*;

pub(crate) use scope::unscope_owned;
pub(crate) use store_adapter::StoreAdapter;

#[cfg(test)]
mod plugin_broker_test;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::storage::KeyValue;
use crate::watch::WatchHandle;
use crate::watch::WatchResult;
use crate::watch::WatchSubscription;
use crate::Result;

/// Operations shared by a broker and its scoped views
///
/// # Consistency Guarantees
///
/// - a completed `put` is visible to every later `get` and `list_values`
/// - `list_values` reads one snapshot revision for the whole listing
/// - watch events for one prefix arrive in commit order
/// - a committed [`Txn`] is applied entirely or not at all
///
/// # Thread Safety
///
/// All methods take `&self` and may be called concurrently.
#[async_trait]
pub trait BytesBroker: Send + Sync {
    /// Upserts `key`. An empty key is rejected with [`crate::Error::InvalidKey`].
    async fn put(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
    ) -> Result<()>;

    /// Upserts `key`; the store deletes it once `ttl` has elapsed
    async fn put_with_ttl(
        &self,
        key: &str,
        value: impl AsRef<[u8]> + Send,
        ttl: Duration,
    ) -> Result<()>;

    /// Latest value of `key`. `Ok(None)` means the key does not exist.
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>>;

    /// Deletes `key`, returns whether it existed. Deleting an absent key
    /// succeeds.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Deletes every key under `prefix` in one commit, returns how many
    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<u64>;

    /// Lazy listing of every pair under `prefix`, in ascending key order
    async fn list_values(
        &self,
        prefix: &str,
    ) -> Result<KvIterator>;

    async fn list_keys(
        &self,
        prefix: &str,
    ) -> Result<KeyIterator>;

    /// Pushes every change to a key under `prefix` into `sender`.
    ///
    /// Returns once the subscription is established. The stream ends with
    /// [`crate::Error::WatchStreamBroken`] if the backend connection is lost.
    async fn watch(
        &self,
        sender: mpsc::Sender<WatchResult>,
        prefix: &str,
    ) -> Result<WatchHandle>;

    /// Watches several prefixes through one channel. Either every prefix is
    /// subscribed or none is.
    async fn watch_all(
        &self,
        sender: mpsc::Sender<WatchResult>,
        prefixes: &[&str],
    ) -> Result<Vec<WatchHandle>> {
        let mut handles = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            match self.watch(sender.clone(), prefix).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        handle.unsubscribe();
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    /// Like [`BytesBroker::watch`] with a channel sized by
    /// `watch.watcher_buffer_size`
    async fn subscribe(
        &self,
        prefix: &str,
    ) -> Result<WatchSubscription>;

    fn new_txn(&self) -> Txn;
}
