use std::sync::Weak;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use super::RegistryInner;
use super::WatchResult;

/// Registration of one subscriber channel on one watched prefix.
///
/// Dropping the handle keeps the subscription alive; it ends when the
/// receiver is dropped, [`WatchHandle::unsubscribe`] is called, the broker is
/// closed or the native stream breaks.
#[derive(Debug)]
pub struct WatchHandle {
    pub(crate) id: u64,
    /// Prefix as the caller passed it
    pub(crate) prefix: String,
    pub(crate) registry: Weak<RegistryInner>,
}

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether the subscription still has a live native stream
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Detaches the subscriber. The sender it was registered with is dropped,
    /// so its channel closes once no other sender is left.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_subscriber(self.id);
        }
        trace!(watcher_id = self.id, prefix = %self.prefix, "unsubscribed");
    }
}

/// Delivery channel created by the broker together with its handle
#[derive(Debug)]
pub struct WatchSubscription {
    receiver: mpsc::Receiver<WatchResult>,
    handle: WatchHandle,
}

impl WatchSubscription {
    pub(crate) fn new(
        receiver: mpsc::Receiver<WatchResult>,
        handle: WatchHandle,
    ) -> Self {
        Self { receiver, handle }
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<WatchResult> {
        self.receiver.recv().await
    }

    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    pub fn into_parts(self) -> (mpsc::Receiver<WatchResult>, WatchHandle) {
        (self.receiver, self.handle)
    }

    pub fn into_stream(self) -> ReceiverStream<WatchResult> {
        ReceiverStream::new(self.receiver)
    }

    pub fn unsubscribe(self) {
        self.handle.unsubscribe();
    }
}
