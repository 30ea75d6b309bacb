//! Configuration management for the broker.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod watch;
pub use watch::*;


use std::env;
use std::fmt::Debug;
use std::time::Duration;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::constants::ENV_SEPARATOR;
use crate::Error;
use crate::Result;

/// Settings for a [`crate::Broker`] and everything derived from it
///
/// Combines all settings with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `KVBROKER__` prefix (highest priority)
///
/// # Configuration Example
///
/// ```toml
/// request_timeout_ms = 3000
/// list_page_size = 128
///
/// [watch]
/// watcher_buffer_size = 10
/// slow_subscriber_policy = "block"
/// ```
#[derive(Serialize, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Upper bound for a single backend call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of pairs fetched per page by list iterators
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Watch subscription settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Debug for BrokerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("list_page_size", &self.list_page_size)
            .finish_non_exhaustive()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            list_page_size: default_list_page_size(),
            watch: WatchConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `KVBROKER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so callers can apply further overrides via
    /// `with_override_config()`. Call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("KVBROKER__LIST_PAGE_SIZE", "64");
    /// let cfg = BrokerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - `request_timeout_ms` is 0
    /// - `list_page_size` is 0
    /// - the watch section is invalid
    pub fn validate(self) -> Result<Self> {
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be at least 1ms".into(),
            ));
        }

        if self.list_page_size == 0 {
            return Err(Error::InvalidConfig(
                "list_page_size must be greater than 0".into(),
            ));
        }

        self.watch.validate()?;
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .ignore_empty(true)
        .try_parsing(true)
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_list_page_size() -> usize {
    128
}
