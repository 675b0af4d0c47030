//! Reconnecting connection manager.
//!
//! [`ConnectionManager`] holds the target and at most one
//! [`TransportClient`]. It is the only place that retries: every other
//! operation reports the client's failure unchanged and leaves recovery to
//! the caller.
//!
//! # State Machine
//!
//! ```text
//! NoClient ──ensure_connected / change_address──► Connecting ──► Connected
//!    ▲                                                               │
//!    └──────────── failure detected / close ─────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{Command, Screenshot, ViewHierarchy};
use crate::transport::{ConnectionState, ConnectionTarget, TransportClient};

use super::forward::{AdbForwarder, PortForwarder};

// ============================================================================
// ManagerState
// ============================================================================

/// Manager-level view of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No client, or the client is closed or failed.
    NoClient,
    /// A client exists and its handshake is in progress.
    ///
    /// The client is stored before its handshake is awaited, so an attempt
    /// cancelled mid-handshake leaves the manager here until the next
    /// `ensure_connected` or `close` discards it.
    Connecting,
    /// The client is alive.
    Connected,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Stable, retrying front for a replaceable [`TransportClient`].
///
/// Methods take `&mut self`: one owner drives reconnection.
///
/// # Example
///
/// ```ignore
/// use device_agent_client::{Config, ConnectionManager};
///
/// let mut manager = ConnectionManager::with_adb(Config::new());
/// if manager.ensure_connected_default().await {
///     let hierarchy = manager.get_view_hierarchy().await?;
///     let screenshot = manager.get_screenshot().await?;
/// }
/// ```
pub struct ConnectionManager {
    /// Address and device id used for new clients.
    target: ConnectionTarget,
    /// Timeouts, port and retry defaults.
    config: Config,
    /// Refreshes the port mapping between attempts.
    forwarder: Arc<dyn PortForwarder>,
    /// Current client, if any.
    client: Option<TransportClient>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Constructors
// ============================================================================

impl ConnectionManager {
    /// Creates a manager targeting `config.ws_url()` on `config.device_id`.
    ///
    /// No connection is made until [`ensure_connected`] or
    /// [`change_address`] is called.
    ///
    /// [`ensure_connected`]: ConnectionManager::ensure_connected
    /// [`change_address`]: ConnectionManager::change_address
    #[must_use]
    pub fn new(config: Config, forwarder: Arc<dyn PortForwarder>) -> Self {
        let target = ConnectionTarget::new(config.ws_url(), config.device_id.clone());
        Self {
            target,
            config,
            forwarder,
            client: None,
        }
    }

    /// Creates a manager that forwards ports with `adb`.
    #[must_use]
    pub fn with_adb(config: Config) -> Self {
        let forwarder = Arc::new(AdbForwarder::from_config(&config));
        Self::new(config, forwarder)
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Returns the current target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current client, if any.
    #[inline]
    #[must_use]
    pub fn client(&self) -> Option<&TransportClient> {
        self.client.as_ref()
    }

    /// Returns the manager-level state derived from the client.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        match &self.client {
            Some(client) if client.is_alive() => ManagerState::Connected,
            Some(client) if client.state() == ConnectionState::Connecting => {
                ManagerState::Connecting
            }
            _ => ManagerState::NoClient,
        }
    }

    /// Returns `true` if the current client is alive.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(TransportClient::is_alive)
    }

    /// Makes sure a live connection exists, reconnecting if needed.
    ///
    /// Returns `true` immediately if the current client is alive. Otherwise
    /// discards it and makes up to `max_retries` attempts with a fresh
    /// client each time. Between attempts the port forward is refreshed and
    /// the manager sleeps `retry_interval`.
    ///
    /// Returns `false` when every attempt failed; never panics.
    pub async fn ensure_connected(&mut self, max_retries: u32, retry_interval: Duration) -> bool {
        if self.is_connected() {
            trace!("Connection alive, nothing to do");
            return true;
        }

        self.discard_client().await;

        for attempt in 1..=max_retries {
            info!(
                attempt,
                max_retries,
                address = %self.target.address,
                "Connecting to agent"
            );

            let fresh = self.new_client();
            let client = self.client.insert(fresh);
            match client.start(self.config.connect_timeout).await {
                Ok(()) if client.is_alive() => return true,
                Ok(()) => warn!(attempt, "Connection dropped right after handshake"),
                Err(e) => warn!(attempt, error = %e, "Connection attempt failed"),
            }
            self.discard_client().await;

            if attempt < max_retries {
                self.refresh_forward().await;
                time::sleep(retry_interval).await;
            }
        }

        warn!(
            max_retries,
            address = %self.target.address,
            "Giving up connecting to agent"
        );
        false
    }

    /// [`ensure_connected`](Self::ensure_connected) with the configured
    /// retry count and interval.
    pub async fn ensure_connected_default(&mut self) -> bool {
        let (max_retries, retry_interval) = (self.config.max_retries, self.config.retry_interval);
        self.ensure_connected(max_retries, retry_interval).await
    }

    /// Switches to a new address and connects once.
    ///
    /// Any existing client is closed first. Does not retry.
    pub async fn change_address(&mut self, address: impl Into<String>) -> bool {
        self.discard_client().await;
        self.target.address = address.into();

        let fresh = self.new_client();
        let client = self.client.insert(fresh);
        match client.start(self.config.connect_timeout).await {
            Ok(()) => {
                info!(address = %self.target.address, "Switched agent address");
                true
            }
            Err(e) => {
                warn!(address = %self.target.address, error = %e, "Failed to switch agent address");
                self.discard_client().await;
                false
            }
        }
    }

    /// Sets the device id used for port forwarding.
    ///
    /// Does not touch the current connection.
    pub fn set_device_id(&mut self, device_id: impl Into<String>) {
        self.target.device_id = device_id.into();
    }

    /// Fetches the current view hierarchy.
    ///
    /// # Errors
    ///
    /// Same as [`TransportClient::request`]; [`Error::ConnectionClosed`] if
    /// there is no client.
    pub async fn get_view_hierarchy(&self) -> Result<ViewHierarchy> {
        let hierarchy = self
            .connected_client()?
            .request(Command::ViewHierarchy, self.config.request_timeout)
            .await?
            .into_view_hierarchy()?;

        debug!(
            views = hierarchy.views.len(),
            width = hierarchy.width,
            height = hierarchy.height,
            "View hierarchy received"
        );
        Ok(hierarchy)
    }

    /// Captures the screen.
    ///
    /// # Errors
    ///
    /// Same as [`TransportClient::request`], plus [`Error::Protocol`] if
    /// the image cannot be decoded.
    pub async fn get_screenshot(&self) -> Result<Screenshot> {
        let data = self
            .connected_client()?
            .request(Command::Screenshot, self.config.request_timeout)
            .await?
            .into_screenshot_data()?;

        let screenshot = Screenshot::from_bytes(data)?;
        debug!(
            bytes = screenshot.as_bytes().len(),
            width = screenshot.width(),
            height = screenshot.height(),
            "Screenshot received"
        );
        Ok(screenshot)
    }

    /// Closes and drops the current client.
    pub async fn close(&mut self) {
        self.discard_client().await;
    }
}

// ============================================================================
// ConnectionManager - Internal
// ============================================================================

impl ConnectionManager {
    fn new_client(&self) -> TransportClient {
        TransportClient::new(self.target.clone()).with_close_timeout(self.config.close_timeout)
    }

    fn connected_client(&self) -> Result<&TransportClient> {
        self.client.as_ref().ok_or(Error::ConnectionClosed)
    }

    async fn discard_client(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }

    /// Runs the forwarder; a failure is logged and the retry continues.
    async fn refresh_forward(&self) {
        let local_port = self.config.local_port;
        if let Err(e) = self
            .forwarder
            .forward(&self.target.device_id, local_port)
            .await
        {
            warn!(
                device_id = %self.target.device_id,
                local_port,
                error = %e,
                "Port forward failed"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
