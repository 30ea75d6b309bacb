// -
// Configuration

/// Environment variable naming an optional configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Prefix for environment variable overrides, e.g. `KVBROKER__LIST_PAGE_SIZE`
pub(crate) const ENV_PREFIX: &str = "KVBROKER";

/// Separator between nested config sections in environment variables
pub(crate) const ENV_SEPARATOR: &str = "__";

// -
// Broker operation names, used in errors, metrics and timing traces

pub(crate) const OP_PUT: &str = "put";
pub(crate) const OP_GET: &str = "get";
pub(crate) const OP_DELETE: &str = "delete";
pub(crate) const OP_LIST: &str = "list";
pub(crate) const OP_TXN: &str = "txn";
pub(crate) const OP_WATCH: &str = "watch";
pub(crate) const OP_CLOSE: &str = "close";
