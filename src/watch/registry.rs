use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::WatchHandle;
use super::WatchResult;
use crate::broker::unscope_owned;
use crate::broker::StoreAdapter;
use crate::config::SlowSubscriberPolicy;
use crate::metrics::ACTIVE_WATCH_STREAMS;
use crate::metrics::WATCH_EVENTS_DELIVERED;
use crate::metrics::WATCH_EVENTS_DROPPED;
use crate::storage::NativeWatchStream;
use crate::storage::WatchEvent;
use crate::Error;
use crate::Result;

/// Local bookkeeping of watch subscriptions for one broker.
///
/// Every subscription owns its native stream and a dispatcher task that
/// consumes it, so a subscriber that stops reading only holds back its own
/// stream.
#[derive(Debug, Clone)]
pub(crate) struct WatchRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    /// Live subscriptions by watcher ID
    watches: DashMap<u64, Arc<ActiveWatch>>,

    /// Next watcher ID (monotonically increasing)
    next_id: AtomicU64,

    policy: SlowSubscriberPolicy,

    /// Cancelled when the owning broker closes
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RegistryInner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RegistryInner")
            .field("watches", &self.watches.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("policy", &self.policy)
            .finish()
    }
}

struct ActiveWatch {
    id: u64,
    /// Prefix as passed by the caller, used in error reports
    prefix: String,
    /// Prefix of the native stream in the full keyspace
    stream_prefix: String,
    /// Scope prefix stripped from delivered keys
    trim: String,
    sender: mpsc::Sender<WatchResult>,
    /// Stops the dispatcher: unsubscribed or broker closed
    cancel: CancellationToken,
}

enum Delivery {
    Delivered,
    Dropped,
    Detached,
}

impl WatchRegistry {
    pub(crate) fn new(
        policy: SlowSubscriberPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                watches: DashMap::new(),
                next_id: AtomicU64::new(1),
                policy,
                shutdown,
            }),
        }
    }

    /// Number of native streams currently open
    pub(crate) fn stream_count(&self) -> usize {
        self.inner.watches.len()
    }

    /// Opens a native stream for `stream_prefix` and starts forwarding its
    /// events to `sender`.
    ///
    /// Returns once the subscription is established: every change committed
    /// after this call returns is delivered.
    pub(crate) async fn register(
        &self,
        adapter: &StoreAdapter,
        stream_prefix: String,
        trim: String,
        prefix: String,
        sender: mpsc::Sender<WatchResult>,
    ) -> Result<WatchHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }

        let native = adapter.watch(&stream_prefix).await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let watch = Arc::new(ActiveWatch {
            id,
            prefix: prefix.clone(),
            stream_prefix,
            trim,
            sender,
            cancel: self.inner.shutdown.child_token(),
        });
        self.inner.watches.insert(id, Arc::clone(&watch));
        debug!(watcher_id = id, prefix = %watch.stream_prefix, watches = self.inner.watches.len(), "opened watch stream");
        tokio::spawn(dispatch(watch, Arc::clone(&self.inner), native));

        Ok(WatchHandle {
            id,
            prefix,
            registry: Arc::downgrade(&self.inner),
        })
    }
}

impl RegistryInner {
    pub(crate) fn contains(
        &self,
        id: u64,
    ) -> bool {
        self.watches.contains_key(&id)
    }

    pub(crate) fn remove_subscriber(
        &self,
        id: u64,
    ) {
        if let Some((_, watch)) = self.watches.remove(&id) {
            watch.cancel.cancel();
        }
    }
}

impl ActiveWatch {
    fn translate(
        &self,
        event: &WatchEvent,
    ) -> WatchResult {
        let key = unscope_owned(&self.trim, event.key.clone())?;
        Ok(WatchEvent {
            key,
            ..event.clone()
        })
    }

    /// Pushes one event to the subscriber. `missed` counts events dropped
    /// since the last lag report.
    async fn deliver(
        &self,
        event: &WatchEvent,
        policy: SlowSubscriberPolicy,
        missed: &mut u64,
    ) -> Delivery {
        let item = self.translate(event);
        match policy {
            SlowSubscriberPolicy::Block => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Delivery::Detached,
                    sent = self.sender.send(item) => match sent {
                        Ok(()) => Delivery::Delivered,
                        Err(_) => Delivery::Detached,
                    },
                }
            }
            SlowSubscriberPolicy::DropAndSignal => self.offer(item, missed),
        }
    }

    fn offer(
        &self,
        item: WatchResult,
        missed: &mut u64,
    ) -> Delivery {
        if *missed > 0 {
            match self.sender.try_send(Err(Error::WatchLagged { missed: *missed })) {
                Ok(()) => *missed = 0,
                Err(TrySendError::Full(_)) => return self.drop_event(missed),
                Err(TrySendError::Closed(_)) => return Delivery::Detached,
            }
        }

        match self.sender.try_send(item) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => self.drop_event(missed),
            Err(TrySendError::Closed(_)) => Delivery::Detached,
        }
    }

    fn drop_event(
        &self,
        missed: &mut u64,
    ) -> Delivery {
        *missed += 1;
        WATCH_EVENTS_DROPPED.with_label_values(&[self.stream_prefix.as_str()]).inc();
        warn!(watcher_id = self.id, prefix = %self.stream_prefix, missed = *missed, "subscriber channel full, event dropped");
        Delivery::Dropped
    }
}

async fn dispatch(
    watch: Arc<ActiveWatch>,
    registry: Arc<RegistryInner>,
    mut native: NativeWatchStream,
) {
    ACTIVE_WATCH_STREAMS.inc();
    let mut missed = 0;

    let broken = loop {
        let next = tokio::select! {
            biased;
            _ = watch.cancel.cancelled() => break None,
            next = native.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if !event.key.starts_with(&watch.stream_prefix) {
                    trace!(key = %event.key, prefix = %watch.stream_prefix, "ignoring event outside prefix");
                    continue;
                }
                match watch.deliver(&event, registry.policy, &mut missed).await {
                    Delivery::Delivered => {
                        WATCH_EVENTS_DELIVERED
                            .with_label_values(&[event.event_type.as_str()])
                            .inc();
                    }
                    Delivery::Dropped => {}
                    Delivery::Detached => break None,
                }
            }
            Some(Err(e)) => break Some(e.to_string()),
            None => break Some("native watch stream ended".to_string()),
        }
    };

    match broken {
        Some(reason) => {
            warn!(watcher_id = watch.id, prefix = %watch.stream_prefix, reason = %reason, "watch stream broken");
            let error = Error::WatchStreamBroken {
                prefix: watch.prefix.clone(),
                reason,
            };
            // The subscriber may be blocked behind a full channel
            tokio::select! {
                _ = watch.cancel.cancelled() => {}
                _ = watch.sender.send(Err(error)) => {}
            }
        }
        None => debug!(watcher_id = watch.id, prefix = %watch.stream_prefix, "watch stream closed"),
    }

    registry.watches.remove(&watch.id);
    ACTIVE_WATCH_STREAMS.dec();
}
