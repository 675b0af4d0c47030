//! Client configuration.
//!
//! A [`Config`] value is built explicitly and passed into the
//! [`ConnectionManager`](crate::ConnectionManager); nothing reads process-wide
//! state. It can be loaded from a JSON file where every field is optional:
//!
//! ```json
//! {
//!   "device_id": "emulator-5554",
//!   "local_port": 6667,
//!   "connect_timeout_ms": 1000,
//!   "max_retries": 3
//! }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use device_agent_client::Config;
//!
//! let config = Config::new()
//!     .with_device_id("emulator-5554")
//!     .with_local_port(7001)
//!     .with_retry_interval(Duration::from_millis(250));
//!
//! assert_eq!(config.ws_url(), "ws://127.0.0.1:7001");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Port the agent listens on inside the device.
pub const DEFAULT_REMOTE_PORT: u16 = 6666;

/// Local port forwarded to the agent.
pub const DEFAULT_LOCAL_PORT: u16 = 6667;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADB_PATH: &str = "adb";
const DEFAULT_OUTPUT_DIR: &str = "RecordResult";

// ============================================================================
// Config
// ============================================================================

/// Connection, retry and capture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Device serial passed to `adb -s`. Empty selects the only device.
    pub device_id: String,

    /// Host the forwarded port is reachable on.
    pub host: String,

    /// Local end of the port forward.
    pub local_port: u16,

    /// Agent port on the device.
    pub remote_port: u16,

    /// Path or name of the `adb` executable.
    pub adb_path: PathBuf,

    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,

    /// Bound on each request/response round trip.
    pub request_timeout: Duration,

    /// Connection attempts made by `ensure_connected`.
    pub max_retries: u32,

    /// Pause between failed attempts.
    pub retry_interval: Duration,

    /// Bound on joining the connection task during close.
    pub close_timeout: Duration,

    /// Directory captured artifacts are written to.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Config {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device_id: String::new(),
            host: DEFAULT_HOST.to_string(),
            local_port: DEFAULT_LOCAL_PORT,
            remote_port: DEFAULT_REMOTE_PORT,
            adb_path: PathBuf::from(DEFAULT_ADB_PATH),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            max_retries: 2,
            retry_interval: Duration::from_millis(500),
            close_timeout: Duration::from_secs(2),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not valid JSON
    /// - [`Error::Config`] if a value fails validation
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not valid JSON
    /// - [`Error::Config`] if a value fails validation
    pub fn from_json(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Config {
    /// Sets the device serial.
    #[inline]
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Sets the host the forwarded port is reachable on.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the local port.
    #[inline]
    #[must_use]
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Sets the agent port on the device.
    #[inline]
    #[must_use]
    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Sets the `adb` executable.
    #[inline]
    #[must_use]
    pub fn with_adb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.adb_path = path.into();
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the number of connection attempts.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the pause between failed attempts.
    #[inline]
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the close join bound.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the artifact output directory.
    #[inline]
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Config {
    /// Returns the agent URL, `ws://{host}:{local_port}`.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.local_port)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.local_port == 0 || self.remote_port == 0 {
            return Err(Error::config("ports must be greater than zero"));
        }
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// ConfigFile
// ============================================================================

/// On-disk shape; durations are in milliseconds.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    device_id: String,
    host: String,
    local_port: u16,
    remote_port: u16,
    adb_path: PathBuf,
    connect_timeout_ms: u64,
    request_timeout_ms: u64,
    max_retries: u32,
    retry_interval_ms: u64,
    close_timeout_ms: u64,
    output_dir: PathBuf,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let config = Config::new();
        Self {
            device_id: config.device_id,
            host: config.host,
            local_port: config.local_port,
            remote_port: config.remote_port,
            adb_path: config.adb_path,
            connect_timeout_ms: config.connect_timeout.as_millis() as u64,
            request_timeout_ms: config.request_timeout.as_millis() as u64,
            max_retries: config.max_retries,
            retry_interval_ms: config.retry_interval.as_millis() as u64,
            close_timeout_ms: config.close_timeout.as_millis() as u64,
            output_dir: config.output_dir,
        }
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            device_id: file.device_id,
            host: file.host,
            local_port: file.local_port,
            remote_port: file.remote_port,
            adb_path: file.adb_path,
            connect_timeout: Duration::from_millis(file.connect_timeout_ms),
            request_timeout: Duration::from_millis(file.request_timeout_ms),
            max_retries: file.max_retries,
            retry_interval: Duration::from_millis(file.retry_interval_ms),
            close_timeout: Duration::from_millis(file.close_timeout_ms),
            output_dir: file.output_dir,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
