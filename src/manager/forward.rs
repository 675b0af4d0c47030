//! Port forwarding to the device agent.
//!
//! The agent listens on a fixed port inside the device. A [`PortForwarder`]
//! maps a local port onto it; [`AdbForwarder`] does so with
//! `adb forward tcp:<local> tcp:<remote>`.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{Config, DEFAULT_REMOTE_PORT};
use crate::error::{Error, Result};

// ============================================================================
// PortForwarder
// ============================================================================

/// Establishes or refreshes the local ↔ device port mapping.
///
/// Implementations must be idempotent: the manager calls `forward` between
/// failed connection attempts without knowing whether a mapping exists.
#[async_trait]
pub trait PortForwarder: Send + Sync {
    /// Maps `local_port` to the agent port on `device_id`.
    ///
    /// An empty `device_id` targets the only attached device.
    async fn forward(&self, device_id: &str, local_port: u16) -> Result<()>;
}

// ============================================================================
// AdbForwarder
// ============================================================================

/// [`PortForwarder`] backed by the `adb` command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbForwarder {
    adb_path: PathBuf,
    remote_port: u16,
}

impl Default for AdbForwarder {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl AdbForwarder {
    /// Creates a forwarder using the given `adb` executable.
    #[must_use]
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            remote_port: DEFAULT_REMOTE_PORT,
        }
    }

    /// Creates a forwarder from the `adb_path` and `remote_port` settings.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.adb_path.clone()).with_remote_port(config.remote_port)
    }

    /// Sets the agent port on the device.
    #[inline]
    #[must_use]
    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Builds the `adb` argument list.
    #[must_use]
    pub fn args(&self, device_id: &str, local_port: u16) -> Vec<String> {
        let mut args = Vec::with_capacity(5);
        if !device_id.is_empty() {
            args.push("-s".to_string());
            args.push(device_id.to_string());
        }
        args.push("forward".to_string());
        args.push(format!("tcp:{local_port}"));
        args.push(format!("tcp:{}", self.remote_port));
        args
    }
}

#[async_trait]
impl PortForwarder for AdbForwarder {
    async fn forward(&self, device_id: &str, local_port: u16) -> Result<()> {
        let args = self.args(device_id, local_port);
        debug!(adb = %self.adb_path.display(), ?args, "Running port forward");

        let output = Command::new(&self.adb_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::forward(format!("failed to run {}: {e}", self.adb_path.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::forward(format!(
                "{} {} exited with {}: {}",
                self.adb_path.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        info!(
            device_id,
            local_port,
            remote_port = self.remote_port,
            "Port forwarded"
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_device() {
        let forwarder = AdbForwarder::default();
        assert_eq!(forwarder.args("", 6667), ["forward", "tcp:6667", "tcp:6666"]);
    }

    #[test]
    fn test_args_with_device() {
        let forwarder = AdbForwarder::new("/opt/adb").with_remote_port(7000);
        assert_eq!(
            forwarder.args("emulator-5554", 7001),
            ["-s", "emulator-5554", "forward", "tcp:7001", "tcp:7000"]
        );
    }

    #[test]
    fn test_from_config() {
        let config = Config::new().with_adb_path("/usr/bin/adb").with_remote_port(6000);
        let forwarder = AdbForwarder::from_config(&config);
        assert_eq!(forwarder.adb_path, PathBuf::from("/usr/bin/adb"));
        assert_eq!(forwarder.remote_port, 6000);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let forwarder = AdbForwarder::new("/nonexistent/adb");
        let err = forwarder.forward("", 6667).await.unwrap_err();
        assert!(matches!(err, Error::Forward { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status() {
        assert!(AdbForwarder::new("true").forward("d", 6667).await.is_ok());

        let err = AdbForwarder::new("false").forward("d", 6667).await.unwrap_err();
        assert!(matches!(err, Error::Forward { .. }));
    }
}
