//! Agent wire protocol.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Format |
//! |---------|-----------|--------|
//! | [`Command`] | Local → Agent | Text frame, e.g. `view_hierarchy` |
//! | [`ResponseEnvelope`] | Agent → Local | Text frame, JSON document |
//!
//! There are no request IDs: at most one request is outstanding per
//! connection, and the next text frame is its reply.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command names |
//! | `envelope` | Reply decoding and decoded types |

// ============================================================================
// Submodules
// ============================================================================

/// Command names.
pub mod command;

/// Reply envelopes.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use envelope::{ResponseEnvelope, Screenshot, ViewHierarchy};
