//! # kv-broker
//!
//! A byte-oriented broker over a strongly consistent, revisioned key-value
//! store.
//!
//! - [`Broker`]: put / get / delete / paged listing / watch / transactions
//! - [`PluginBroker`]: the same operations confined to one key prefix
//! - [`KvBackend`]: the contract a store client implements; [`MemKvBackend`]
//!   is an in-process implementation
//!
//! ```ignore
//! use std::sync::Arc;
//! use kv_broker::{Broker, BrokerConfig, BytesBroker, MemKvBackend};
//!
//! let broker = Broker::new(Arc::new(MemKvBackend::new()), BrokerConfig::new()?)?;
//! let plugin = broker.new_plugin_broker("/my/prefix/");
//! let mut sub = plugin.subscribe("vals/").await?;
//! plugin.put("vals/val1", b"1").await?;
//! let event = sub.recv().await;
//! broker.close().await?;
//! ```

mod broker;
mod config;
mod constants;
mod errors;
mod metrics;
mod storage;
mod utils;
mod watch;

pub use broker::*;
pub use config::*;
pub use errors::*;
pub use metrics::gather_metrics;
pub use storage::*;
pub use watch::*;

#[cfg(test)]
mod errors_test;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
