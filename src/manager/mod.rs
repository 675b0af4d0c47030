//! Connection management.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionManager`] | Owns the client, reconnects with bounded retries |
//! | [`PortForwarder`] | Refreshes the local ↔ device port mapping |
//! | [`AdbForwarder`] | `adb forward` implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnecting manager.
pub mod core;

/// Port forwarding.
pub mod forward;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{ConnectionManager, ManagerState};
pub use forward::{AdbForwarder, PortForwarder};
