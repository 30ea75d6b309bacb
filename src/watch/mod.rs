//! Watch subscriptions over the backend's native change streams
//!
//! ```text
//! native stream (one per subscription)
//!        ↓
//! dispatcher task: filter by prefix -> unscope -> send
//!        ↓
//! subscriber channel (caller's Sender)
//! ```
//!
//! Subscriptions are independent: each receives every matching event in
//! commit order, and a full channel only holds back its own stream.

mod registry;
mod subscription;

pub(crate) use registry::*;
pub use subscription::*;


use crate::storage::WatchEvent;
use crate::Result;

/// Item delivered on a subscriber channel
pub type WatchResult = Result<WatchEvent>;
