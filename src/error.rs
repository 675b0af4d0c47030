//! Error types for the device agent client.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use device_agent_client::{ConnectionManager, Result};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     let hierarchy = manager.get_view_hierarchy().await?;
//!     println!("{} views", hierarchy.views.len());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Timeout | [`Error::RequestTimeout`] |
//! | Protocol | [`Error::Protocol`] |
//! | Device tooling | [`Error::Forward`], [`Error::Capture`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! A request timeout is deliberately not a connection error: the agent may
//! simply be slow, and the connection stays usable.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the configuration file or a configured value is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket handshake failed or the connection errored.
    ///
    /// The socket's own error is flattened to text so it can be latched in
    /// the shared state and handed to every later caller.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete within the start timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation attempted against a closed or absent connection.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No response arrived within the request window.
    ///
    /// The connection is not presumed dead.
    #[error("Request '{command}' timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command text that was sent.
        command: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Response received but not in the expected envelope shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// Port forwarding command failed.
    #[error("Port forward failed: {message}")]
    Forward {
        /// Description of the failure, including tool output.
        message: String,
    },

    /// Capturing the screen without the agent failed.
    #[error("Screen capture failed: {message}")]
    Capture {
        /// Description of the failure, including tool output.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(command: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            command: command.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a port forward error.
    #[inline]
    pub fn forward(message: impl Into<String>) -> Self {
        Self::Forward {
            message: message.into(),
        }
    }

    /// Creates a screen capture error.
    #[inline]
    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if a request went unanswered within its window.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    ///
    /// Includes handshake timeouts: a client whose `start` timed out must be
    /// discarded like one that failed outright.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionTimeout { .. } | Self::ConnectionClosed
        )
    }

    /// Returns `true` if a response arrived but could not be decoded.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if reconnecting may help.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error() || self.is_timeout()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = Error::request_timeout("screenshot", 1000);
        assert_eq!(
            err.to_string(),
            "Request 'screenshot' timed out after 1000ms"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::request_timeout("view_hierarchy", 10).is_timeout());
        assert!(!Error::connection_timeout(10).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::request_timeout("screenshot", 1000).is_connection_error());
        assert!(!Error::protocol("bad").is_connection_error());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::protocol("missing field").is_protocol_error());
        assert!(!Error::config("x").is_protocol_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(Error::request_timeout("screenshot", 5).is_recoverable());
        assert!(!Error::protocol("bad").is_recoverable());
        assert!(!Error::forward("adb missing").is_recoverable());
        assert!(!Error::capture("no output").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "adb not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
