use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::storage::DeleteResponse;
use crate::storage::KeyValue;
use crate::storage::KvBackend;
use crate::storage::NativeWatchStream;
use crate::storage::RangeRequest;
use crate::storage::RangeResponse;
use crate::storage::TxnOp;
use crate::storage::WatchEvent;
use crate::storage::WatchEventType;
use crate::StorageError;
use crate::StorageResult;

/// In-memory, revisioned key-value store
///
/// All commits are serialized by one mutex, which gives a single global commit
/// order: every committed change gets a strictly increasing revision and is
/// pushed to matching watch streams before the lock is released.
///
/// Every key keeps its version history until [`MemKvBackend::compact`] so
/// range scans can be served at an older snapshot revision.
#[derive(Debug, Default)]
pub struct MemKvBackend {
    state: Mutex<MemState>,
}

#[derive(Debug, Default)]
struct MemState {
    revision: u64,
    compacted: u64,
    keys: BTreeMap<String, Vec<Version>>,
    watchers: Vec<NativeWatcher>,
    unavailable: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
struct Version {
    revision: u64,
    /// `None` marks a deletion
    value: Option<Bytes>,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct NativeWatcher {
    prefix: String,
    sender: mpsc::UnboundedSender<StorageResult<WatchEvent>>,
}

impl MemKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed revision
    pub fn current_revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Number of open native watch streams
    pub fn watch_stream_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    /// Discards history at and below `revision`, keeping the version of every
    /// key that is visible at `revision`.
    ///
    /// Range scans pinned below the compaction point fail with
    /// [`StorageError::Compacted`].
    pub fn compact(
        &self,
        revision: u64,
    ) {
        let mut state = self.state.lock();
        let revision = revision.min(state.revision);

        state.keys.retain(|_, versions| {
            let visible = versions.iter().rposition(|v| v.revision <= revision);
            if let Some(idx) = visible {
                versions.drain(..idx);
                if versions[0].value.is_none() {
                    versions.remove(0);
                }
            }
            !versions.is_empty()
        });
        state.compacted = state.compacted.max(revision);

        debug!(revision, "compacted history");
    }

    /// Simulates losing or regaining the connection to the store.
    ///
    /// While unavailable every call fails with [`StorageError::Unavailable`].
    /// Going unavailable breaks every open watch stream.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        let mut state = self.state.lock();
        state.unavailable = !available;
        if !available {
            state.break_watchers(StorageError::Unavailable("connection lost".into()));
        }
        info!(available, "backend availability changed");
    }
}

impl MemState {
    fn check(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if self.unavailable {
            return Err(StorageError::Unavailable("backend unreachable".into()));
        }
        Ok(())
    }

    fn live_value(
        versions: &[Version],
        revision: u64,
    ) -> Option<(u64, &Bytes)> {
        let version = versions.iter().rev().find(|v| v.revision <= revision)?;
        version.value.as_ref().map(|value| (version.revision, value))
    }

    fn latest(
        &self,
        key: &str,
    ) -> Option<(u64, &Bytes)> {
        self.keys
            .get(key)
            .and_then(|versions| Self::live_value(versions, self.revision))
    }

    /// Turns every expired key into a deletion committed at one new revision
    fn expire(
        &mut self,
        now: Instant,
    ) {
        let expired: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, versions)| {
                versions.last().is_some_and(|v| {
                    v.value.is_some() && v.expires_at.is_some_and(|at| at <= now)
                })
            })
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        self.revision += 1;
        let revision = self.revision;
        for key in expired {
            trace!(key = %key, revision, "key expired");
            self.apply_delete(key, revision);
        }
    }

    fn push_version(
        &mut self,
        key: &str,
        version: Version,
    ) -> Option<Bytes> {
        let versions = self.keys.entry(key.to_string()).or_default();
        let prev = versions.last().and_then(|v| v.value.clone());

        // Same key written twice in one txn: the later op wins at that revision
        match versions.last_mut() {
            Some(last) if last.revision == version.revision => *last = version,
            _ => versions.push(version),
        }
        prev
    }

    fn apply_put(
        &mut self,
        key: String,
        value: Bytes,
        expires_at: Option<Instant>,
        revision: u64,
    ) {
        let prev_value = self.push_version(
            &key,
            Version {
                revision,
                value: Some(value.clone()),
                expires_at,
            },
        );
        self.emit(WatchEvent {
            event_type: WatchEventType::Put,
            key,
            value,
            prev_value,
            revision,
        });
    }

    fn apply_delete(
        &mut self,
        key: String,
        revision: u64,
    ) {
        if self.latest(&key).is_none() {
            // Deleted earlier in the same txn, or never existed
            return;
        }
        let prev_value = self.push_version(
            &key,
            Version {
                revision,
                value: None,
                expires_at: None,
            },
        );
        self.emit(WatchEvent {
            event_type: WatchEventType::Delete,
            key,
            value: Bytes::new(),
            prev_value,
            revision,
        });
    }

    fn emit(
        &mut self,
        event: WatchEvent,
    ) {
        self.watchers.retain(|watcher| {
            if !event.key.starts_with(&watcher.prefix) {
                return true;
            }
            // Receiver dropped means the watch was cancelled
            watcher.sender.send(Ok(event.clone())).is_ok()
        });
    }

    fn break_watchers(
        &mut self,
        error: StorageError,
    ) {
        for watcher in self.watchers.drain(..) {
            let _ = watcher.sender.send(Err(error.clone()));
        }
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

#[async_trait]
impl KvBackend for MemKvBackend {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> StorageResult<u64> {
        validate_key(key)?;
        let now = Instant::now();

        let mut state = self.state.lock();
        state.check()?;
        state.expire(now);

        state.revision += 1;
        let revision = state.revision;
        state.apply_put(key.to_string(), value, ttl.map(|ttl| now + ttl), revision);

        trace!(key, revision, "put committed");
        Ok(revision)
    }

    async fn get(
        &self,
        key: &str,
    ) -> StorageResult<Option<KeyValue>> {
        let mut state = self.state.lock();
        state.check()?;
        state.expire(Instant::now());

        Ok(state.latest(key).map(|(revision, value)| KeyValue {
            key: key.to_string(),
            value: value.clone(),
            revision,
        }))
    }

    async fn delete(
        &self,
        key: &str,
        prefix: bool,
    ) -> StorageResult<DeleteResponse> {
        if !prefix {
            validate_key(key)?;
        }

        let mut state = self.state.lock();
        state.check()?;
        state.expire(Instant::now());

        let targets: Vec<String> = if prefix {
            let revision = state.revision;
            state
                .keys
                .range::<str, _>((Bound::Included(key), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(key))
                .filter(|(_, versions)| MemState::live_value(versions, revision).is_some())
                .map(|(k, _)| k.clone())
                .collect()
        } else if state.latest(key).is_some() {
            vec![key.to_string()]
        } else {
            Vec::new()
        };

        if targets.is_empty() {
            return Ok(DeleteResponse {
                deleted: 0,
                revision: state.revision,
            });
        }

        state.revision += 1;
        let revision = state.revision;
        let deleted = targets.len() as u64;
        for target in targets {
            state.apply_delete(target, revision);
        }

        trace!(key, prefix, deleted, revision, "delete committed");
        Ok(DeleteResponse { deleted, revision })
    }

    async fn range(
        &self,
        request: RangeRequest,
    ) -> StorageResult<RangeResponse> {
        let mut state = self.state.lock();
        state.check()?;
        state.expire(Instant::now());

        let revision = request.revision.unwrap_or(state.revision);
        if revision < state.compacted {
            return Err(StorageError::Compacted {
                requested: revision,
                compacted: state.compacted,
            });
        }
        if revision > state.revision {
            return Err(StorageError::InvalidArgument(format!(
                "revision {} is newer than current revision {}",
                revision, state.revision
            )));
        }

        let start = match request.start_after.as_deref() {
            Some(after) if after >= request.prefix.as_str() => Bound::Excluded(after),
            _ => Bound::Included(request.prefix.as_str()),
        };

        let mut matching = state
            .keys
            .range::<str, _>((start, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&request.prefix))
            .filter_map(|(k, versions)| {
                MemState::live_value(versions, revision).map(|(mod_revision, value)| KeyValue {
                    key: k.clone(),
                    value: if request.keys_only {
                        Bytes::new()
                    } else {
                        value.clone()
                    },
                    revision: mod_revision,
                })
            });

        let mut kvs = Vec::new();
        let mut more = false;
        for kv in matching.by_ref() {
            if request.limit > 0 && kvs.len() == request.limit {
                more = true;
                break;
            }
            kvs.push(kv);
        }

        Ok(RangeResponse {
            kvs,
            more,
            revision,
        })
    }

    async fn txn(
        &self,
        ops: Vec<TxnOp>,
    ) -> StorageResult<u64> {
        for op in &ops {
            validate_key(op.key())?;
        }

        let mut state = self.state.lock();
        state.check()?;
        state.expire(Instant::now());

        if ops.is_empty() {
            return Ok(state.revision);
        }

        state.revision += 1;
        let revision = state.revision;
        let count = ops.len();
        for op in ops {
            match op {
                TxnOp::Put { key, value } => state.apply_put(key, value, None, revision),
                TxnOp::Delete { key } => state.apply_delete(key, revision),
            }
        }

        trace!(ops = count, revision, "txn committed");
        Ok(revision)
    }

    async fn watch(
        &self,
        prefix: &str,
    ) -> StorageResult<NativeWatchStream> {
        let mut state = self.state.lock();
        state.check()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.watchers.push(NativeWatcher {
            prefix: prefix.to_string(),
            sender,
        });

        debug!(prefix, streams = state.watchers.len(), "native watch opened");
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn close(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.break_watchers(StorageError::Closed);

        info!("memory backend closed");
        Ok(())
    }
}
