//! WebSocket transport layer.
//!
//! This module handles the single connection between the local end (Rust)
//! and the device agent, reached through a forwarded local port.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌─────────────────┐
//! │ TransportClient  │        WebSocket         │  Device agent   │
//! │                  │◄────────────────────────►│                 │
//! │  watch<Shared>   │  localhost:PORT ─ adb ─► │  device:6666    │
//! │  ▲          ▲    │                          │                 │
//! │  caller   I/O    │                          │                 │
//! │  task     task   │                          │                 │
//! └──────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `TransportClient::new` - Copy the target, nothing opened yet
//! 2. `TransportClient::start` - Spawn the I/O task, wait for the handshake
//! 3. `TransportClient::request` - One request at a time
//! 4. `TransportClient::close` - Stop and join the I/O task
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Client and I/O task |
//! | `state` | Shared state record |
//! | `target` | Address and device id |

// ============================================================================
// Submodules
// ============================================================================

/// Client and I/O task.
pub mod client;

/// State shared with the I/O task.
pub mod state;

/// Connection target.
pub mod target;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::TransportClient;
pub use state::ConnectionState;
pub use target::ConnectionTarget;
