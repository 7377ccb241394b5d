//! Configuration for settingstore
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, StoreError};

/// Refresh interval used when none (or zero) is configured
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Wait between writing a bootstrap document and fetching it again
pub const DEFAULT_BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(10);

/// Upper bound on the bootstrap retry loop
pub const DEFAULT_BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Default directory for cache records
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/setting-management";

/// Configuration for a single [`Store`](crate::Store) instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Document Configuration
    // -------------------------------------------------------------------------
    /// Namespace (collection) that holds the configuration document
    pub namespace: String,

    /// Seed document used when the remote store has none
    pub default: Option<Value>,

    // -------------------------------------------------------------------------
    // Scheduling Configuration
    // -------------------------------------------------------------------------
    /// How often the background refresher re-fetches the document
    pub refresh_interval: Duration,

    /// Wait between bootstrap and the next fetch attempt
    pub bootstrap_backoff: Duration,

    /// Give up on bootstrap after this long (`None` waits forever)
    pub bootstrap_deadline: Option<Duration>,

    // -------------------------------------------------------------------------
    // Local Cache Configuration
    // -------------------------------------------------------------------------
    /// Directory for cache records, one file per namespace:
    ///   {cache_dir}/
    ///     └── {namespace, percent-encoded}.cache
    pub cache_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Error Reporting
    // -------------------------------------------------------------------------
    /// Capacity of the asynchronous error channel
    pub error_channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            bootstrap_backoff: DEFAULT_BOOTSTRAP_BACKOFF,
            bootstrap_deadline: Some(DEFAULT_BOOTSTRAP_DEADLINE),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            error_channel_capacity: 64,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Check the construction contract and normalise optional fields
    ///
    /// Returns the validated default document.
    pub(crate) fn validate(&mut self) -> Result<Value> {
        if self.namespace.trim().is_empty() {
            return Err(StoreError::Config("namespace not specified on store".into()));
        }

        let default = match &self.default {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
            Some(Value::Object(_)) => {
                return Err(StoreError::Config("default on store is empty".into()))
            }
            Some(other) => {
                return Err(StoreError::Config(format!(
                    "default on store must be an object, got {}",
                    json_kind(other)
                )))
            }
            None => return Err(StoreError::Config("default not specified on store".into())),
        };

        if self.refresh_interval.is_zero() {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        if self.error_channel_capacity == 0 {
            self.error_channel_capacity = 1;
        }

        Ok(default)
    }

    /// Path of the cache record for this namespace
    pub fn cache_path(&self) -> PathBuf {
        cache_path_for(&self.cache_dir, &self.namespace)
    }
}

/// Derive the cache file path for a namespace
///
/// Bytes outside `[A-Za-z0-9._-]` (and a leading `.`) are percent-encoded,
/// `%` included. The mapping is injective, so distinct namespaces never share
/// a record, and the name can never escape `dir`.
pub fn cache_path_for(dir: &Path, namespace: &str) -> PathBuf {
    let mut name = String::with_capacity(namespace.len());
    for (i, byte) in namespace.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && i > 0);
        if plain {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    dir.join(format!("{}.cache", name))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the namespace holding the document
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the default document
    pub fn default_document(mut self, value: Value) -> Self {
        self.config.default = Some(value);
        self
    }

    /// Set the background refresh interval
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    /// Set the wait between bootstrap and re-fetch
    pub fn bootstrap_backoff(mut self, backoff: Duration) -> Self {
        self.config.bootstrap_backoff = backoff;
        self
    }

    /// Set the bootstrap deadline (`None` = unbounded)
    pub fn bootstrap_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.config.bootstrap_deadline = deadline;
        self
    }

    /// Set the directory for cache records
    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = path.into();
        self
    }

    /// Set the capacity of the error channel
    pub fn error_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.error_channel_capacity = capacity;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

/// Configuration for the TCP gateway client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Document server address (host:port)
    pub addr: String,

    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Socket write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9200".to_string(),
            connect_timeout_ms: 3000,
            read_timeout_ms: 3000,
            write_timeout_ms: 3000,
        }
    }
}

/// Configuration for the document server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9200".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}
