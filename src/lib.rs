//! Device agent client - request/response channel to an on-device agent.
//!
//! An agent app on the device serves a WebSocket on a fixed port. The host
//! forwards a local port to it (`adb forward`) and asks for the current view
//! hierarchy or a screenshot.
//!
//! # Architecture
//!
//! - **[`TransportClient`]**: one WebSocket connection, one I/O task, at
//!   most one request in flight. Never retries.
//! - **[`ConnectionManager`]**: owns zero or one client and reconnects with
//!   bounded retries, refreshing the port forward between attempts.
//! - **[`PortForwarder`]**: maps the local port to the device
//!   ([`AdbForwarder`] shells out to `adb`).
//! - **[`capture::Recorder`]**: saves captures to disk, falling back to
//!   [`capture::AdbScreenCapturer`] when the agent has no screenshot.
//!
//! # Quick Start
//!
//! ```no_run
//! use device_agent_client::{Config, ConnectionManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::new().with_device_id("emulator-5554");
//!     let mut manager = ConnectionManager::with_adb(config);
//!
//!     if !manager.ensure_connected_default().await {
//!         eprintln!("agent unreachable");
//!         return Ok(());
//!     }
//!
//!     let hierarchy = manager.get_view_hierarchy().await?;
//!     println!("{}x{}, {} views", hierarchy.width, hierarchy.height, hierarchy.views.len());
//!
//!     let screenshot = manager.get_screenshot().await?;
//!     std::fs::write("screen.png", screenshot.as_bytes())?;
//!
//!     manager.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capture`] | Saving captures to disk |
//! | [`config`] | Explicit configuration value |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`manager`] | Reconnecting manager and port forwarding |
//! | [`protocol`] | Commands and reply envelopes |
//! | [`transport`] | WebSocket client and shared state |

// ============================================================================
// Modules
// ============================================================================

/// Saving captures to disk.
pub mod capture;

/// Connection, retry and capture settings.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Reconnecting connection manager and port forwarding.
pub mod manager;

/// Agent wire protocol.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::Config;

// Error types
pub use error::{Error, Result};

// Manager types
pub use manager::{AdbForwarder, ConnectionManager, ManagerState, PortForwarder};

// Protocol types
pub use protocol::{Command, ResponseEnvelope, Screenshot, ViewHierarchy};

// Transport types
pub use transport::{ConnectionState, ConnectionTarget, TransportClient};
