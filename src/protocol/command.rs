//! Agent commands.
//!
//! Each command is sent as a bare UTF-8 text frame; the agent answers with
//! a JSON document whose shape depends on the command.
//!
//! | Command | Wire text | Response |
//! |---------|-----------|----------|
//! | [`Command::ViewHierarchy`] | `view_hierarchy` | `{"message", "width", "height"}` |
//! | [`Command::Screenshot`] | `screenshot` | `{"data"}` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Command
// ============================================================================

/// A request understood by the device agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Dump the current view hierarchy.
    ViewHierarchy,
    /// Capture the screen as PNG.
    Screenshot,
}

impl Command {
    /// Returns the text frame sent for this command.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ViewHierarchy => "view_hierarchy",
            Self::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
