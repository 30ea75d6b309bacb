use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// What a watch dispatcher does when a subscriber's channel is full
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlowSubscriberPolicy {
    /// Wait for channel capacity. The native stream is not consumed meanwhile,
    /// so no event is ever lost.
    #[default]
    Block,

    /// Drop the event and report the gap to the subscriber as
    /// [`crate::Error::WatchLagged`] before its next delivered event.
    DropAndSignal,
}

/// Watch subscription settings
///
/// ```toml
/// [watch]
/// watcher_buffer_size = 10
/// slow_subscriber_policy = "block"
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Buffer size of delivery channels created by `subscribe()`
    ///
    /// Channels passed to `watch()` keep whatever capacity the caller chose.
    ///
    /// **Default**: 10
    #[serde(default = "default_watcher_buffer_size")]
    pub watcher_buffer_size: usize,

    /// **Default**: block
    #[serde(default)]
    pub slow_subscriber_policy: SlowSubscriberPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watcher_buffer_size: default_watcher_buffer_size(),
            slow_subscriber_policy: SlowSubscriberPolicy::default(),
        }
    }
}

impl WatchConfig {
    /// Validates watch configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.watcher_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "watch.watcher_buffer_size must be greater than 0".into(),
            ));
        }

        if self.watcher_buffer_size > 1000 {
            warn!(
                "watch.watcher_buffer_size ({}) is very large. Each subscriber may hold that many undelivered events",
                self.watcher_buffer_size
            );
        }

        Ok(())
    }
}

const fn default_watcher_buffer_size() -> usize {
    10
}
