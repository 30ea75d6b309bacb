use std::collections::VecDeque;

use futures::Stream;
use futures::TryStreamExt;
use tracing::trace;

use super::scope::unscope_owned;
use super::StoreAdapter;
use crate::storage::KeyValue;
use crate::storage::RangeRequest;
use crate::Result;

/// Lazy, paged listing of every pair under a prefix.
///
/// The first page is fetched when the iterator is created and fixes the
/// snapshot revision. Later pages are read at that revision, so writes
/// committed while iterating are never observed. Pairs come in ascending key
/// order with the scope prefix removed.
#[derive(Debug)]
pub struct KvIterator {
    adapter: StoreAdapter,
    /// Listed prefix in the full keyspace
    prefix: String,
    /// Scope prefix stripped from returned keys
    trim: String,
    revision: u64,
    page_size: usize,
    keys_only: bool,
    buffer: VecDeque<KeyValue>,
    last_key: Option<String>,
    more: bool,
}

impl KvIterator {
    pub(crate) async fn open(
        adapter: StoreAdapter,
        prefix: String,
        trim: String,
        page_size: usize,
        keys_only: bool,
    ) -> Result<Self> {
        let mut iter = Self {
            adapter,
            prefix,
            trim,
            revision: 0,
            page_size,
            keys_only,
            buffer: VecDeque::with_capacity(page_size),
            last_key: None,
            more: true,
        };
        let revision = iter.fetch_page(None).await?;
        iter.revision = revision;
        Ok(iter)
    }

    /// Snapshot revision every page is read at
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Next pair, or `None` once the listing is exhausted
    pub async fn next(&mut self) -> Result<Option<KeyValue>> {
        if self.buffer.is_empty() && self.more {
            self.fetch_page(Some(self.revision)).await?;
        }

        match self.buffer.pop_front() {
            Some(mut kv) => {
                kv.key = unscope_owned(&self.trim, kv.key)?;
                Ok(Some(kv))
            }
            None => Ok(None),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<KeyValue>> + Send {
        futures::stream::try_unfold(self, |mut iter| async move {
            Ok(iter.next().await?.map(|kv| (kv, iter)))
        })
    }

    /// Drains the remaining pairs
    pub async fn collect_all(self) -> Result<Vec<KeyValue>> {
        self.into_stream().try_collect().await
    }

    async fn fetch_page(
        &mut self,
        revision: Option<u64>,
    ) -> Result<u64> {
        let response = self
            .adapter
            .range(RangeRequest {
                prefix: self.prefix.clone(),
                start_after: self.last_key.clone(),
                limit: self.page_size,
                revision,
                keys_only: self.keys_only,
            })
            .await?;

        trace!(
            prefix = %self.prefix,
            revision = response.revision,
            count = response.kvs.len(),
            more = response.more,
            "fetched list page"
        );

        if let Some(last) = response.kvs.last() {
            self.last_key = Some(last.key.clone());
        }
        self.more = response.more;
        self.buffer.extend(response.kvs);
        Ok(response.revision)
    }
}

/// Keys-only variant of [`KvIterator`] with the same snapshot and paging rules
#[derive(Debug)]
pub struct KeyIterator {
    inner: KvIterator,
}

impl KeyIterator {
    pub(crate) fn new(inner: KvIterator) -> Self {
        Self { inner }
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision()
    }

    pub async fn next(&mut self) -> Result<Option<String>> {
        Ok(self.inner.next().await?.map(|kv| kv.key))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String>> + Send {
        self.inner.into_stream().map_ok(|kv| kv.key)
    }

    pub async fn collect_all(self) -> Result<Vec<String>> {
        self.into_stream().try_collect().await
    }
}
