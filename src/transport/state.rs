//! Connection state shared between a client and its I/O task.
//!
//! Everything the caller and the background task both touch lives in one
//! [`Shared`] record behind a `tokio::sync::watch` channel. The task's
//! handlers (`on_open`, `on_message`, `on_error`, `on_close`) are plain state
//! transitions applied with `send_modify`, which also wakes every waiter.

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started, closed locally, or closed by the agent.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake completed, frames can flow.
    Connected,
    /// Handshake or socket error; latched until the client is discarded.
    Failed(String),
}

impl ConnectionState {
    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` once the handshake has produced an outcome.
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Connecting)
    }
}

// ============================================================================
// ResultSlot
// ============================================================================

/// Single-slot hand-off of a reply from the I/O task to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum ResultSlot {
    /// Nothing requested, or the last reply was claimed.
    #[default]
    Empty,
    /// A request was sent and nothing has arrived yet.
    Armed,
    /// A reply arrived and has not been claimed.
    Filled(String),
}

impl ResultSlot {
    #[inline]
    pub(crate) fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    /// Claims a filled reply, leaving the slot empty.
    pub(crate) fn take(&mut self) -> Option<String> {
        match std::mem::take(self) {
            Self::Filled(text) => Some(text),
            other => {
                *self = other;
                None
            }
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State observed by both the caller and the I/O task.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: ConnectionState,
    /// Socket is open for writing; cleared on close frame, EOF or write error.
    pub(crate) socket_open: bool,
    pub(crate) error: Option<String>,
    pub(crate) slot: ResultSlot,
}

impl Shared {
    pub(crate) fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.socket_open = true;
        self.error = None;
    }

    /// Stores a reply. Overwrites whatever the slot held.
    pub(crate) fn on_message(&mut self, text: String) {
        self.slot = ResultSlot::Filled(text);
    }

    pub(crate) fn on_error(&mut self, reason: String) {
        self.state = ConnectionState::Failed(reason.clone());
        self.socket_open = false;
        self.error = Some(reason);
    }

    pub(crate) fn on_close(&mut self) {
        self.socket_open = false;
        if !matches!(self.state, ConnectionState::Failed(_)) {
            self.state = ConnectionState::Disconnected;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_clears_error() {
        let mut shared = Shared {
            error: Some("old".into()),
            ..Default::default()
        };
        shared.on_open();
        assert!(shared.state.is_connected());
        assert!(shared.socket_open);
        assert!(shared.error.is_none());
    }

    #[test]
    fn test_error_is_latched_through_close() {
        let mut shared = Shared::default();
        shared.on_open();
        shared.on_error("reset by peer".into());
        shared.on_close();

        assert_eq!(shared.state, ConnectionState::Failed("reset by peer".into()));
        assert_eq!(shared.error.as_deref(), Some("reset by peer"));
        assert!(!shared.socket_open);
    }

    #[test]
    fn test_close_after_open() {
        let mut shared = Shared::default();
        shared.on_open();
        shared.on_close();
        assert_eq!(shared.state, ConnectionState::Disconnected);
        assert!(shared.error.is_none());
    }

    #[test]
    fn test_slot_last_writer_wins() {
        let mut shared = Shared::default();
        shared.slot = ResultSlot::Armed;
        shared.on_message("first".into());
        shared.on_message("second".into());
        assert_eq!(shared.slot.take().as_deref(), Some("second"));
        assert_eq!(shared.slot, ResultSlot::Empty);
    }

    #[test]
    fn test_take_armed_slot() {
        let mut slot = ResultSlot::Armed;
        assert!(slot.take().is_none());
        assert_eq!(slot, ResultSlot::Armed);
    }

    #[test]
    fn test_settled() {
        assert!(!ConnectionState::Connecting.is_settled());
        assert!(ConnectionState::Connected.is_settled());
        assert!(ConnectionState::Failed("x".into()).is_settled());
        assert!(ConnectionState::Disconnected.is_settled());
    }
}
