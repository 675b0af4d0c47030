//! Single-connection WebSocket client and its I/O task.
//!
//! A [`TransportClient`] owns exactly one connection attempt. `start` spawns
//! a tokio task that performs the handshake and then pumps frames; the
//! caller only ever waits on the shared state record.
//!
//! # Event Loop
//!
//! The spawned task handles:
//!
//! - The WebSocket handshake (cancellable by `close`)
//! - Incoming text frames, stored in the single result slot
//! - Outgoing request frames queued by `request`
//! - Close frames, EOF and socket errors, latched into the state
//!
//! There is no correlation by ID. One request may be in flight at a time,
//! and whichever frame arrives next fills the slot.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Command, ResponseEnvelope};

use super::state::{ConnectionState, ResultSlot, Shared};
use super::target::ConnectionTarget;

// ============================================================================
// Constants
// ============================================================================

/// Bound on joining the I/O task during `close`.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Frames and control messages for the I/O task.
#[derive(Debug)]
enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the socket and exit.
    Shutdown,
}

type SharedState = Arc<watch::Sender<Shared>>;

// ============================================================================
// TransportClient
// ============================================================================

/// One WebSocket connection to the device agent.
///
/// Created fresh for every connection attempt and never restarted.
/// Requests must be issued one at a time: do not call [`request`] again
/// until the previous call has returned.
///
/// [`request`]: TransportClient::request
pub struct TransportClient {
    /// Target copied at construction.
    target: ConnectionTarget,
    /// State record shared with the I/O task.
    shared: SharedState,
    /// Queue into the I/O task.
    command_tx: mpsc::UnboundedSender<Outbound>,
    /// Receiving end, handed to the task by `start`.
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    /// I/O task handle, taken by `close`.
    task: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient")
            .field("address", &self.target.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TransportClient - Public API
// ============================================================================

impl TransportClient {
    /// Creates an unstarted client for `target`.
    #[must_use]
    pub fn new(target: ConnectionTarget) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shared, _) = watch::channel(Shared::default());

        Self {
            target,
            shared: Arc::new(shared),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            task: Mutex::new(None),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets the bound used when joining the I/O task on close.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Returns the target this client connects to.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.borrow().state.clone()
    }

    /// Opens the connection, waiting at most `timeout` for the handshake.
    ///
    /// The handshake runs on a spawned task. This returns as soon as it
    /// succeeds or fails; if neither happens in time the client is left in
    /// an indeterminate state and must be closed and discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the handshake failed, the address is
    ///   invalid, or the client was already started
    /// - [`Error::ConnectionTimeout`] if the handshake did not finish in time
    pub async fn start(&self, timeout: Duration) -> Result<()> {
        let url = self.target.url()?;
        let command_rx = self
            .command_rx
            .lock()
            .take()
            .ok_or_else(|| Error::connection("client already started or closed"))?;

        self.shared.send_modify(|s| s.state = ConnectionState::Connecting);
        let mut state_rx = self.shared.subscribe();

        let handle = tokio::spawn(Self::run_event_loop(
            url.to_string(),
            Arc::clone(&self.shared),
            command_rx,
        ));
        *self.task.lock() = Some(handle);

        let settled = time::timeout(timeout, state_rx.wait_for(|s| s.state.is_settled()))
            .await
            .is_ok();

        let shared = self.shared.borrow();
        if let Some(reason) = &shared.error {
            return Err(Error::connection(reason.clone()));
        }
        match shared.state {
            ConnectionState::Connected => Ok(()),
            _ if !settled => Err(Error::connection_timeout(timeout.as_millis() as u64)),
            _ => Err(Error::connection("closed during handshake")),
        }
    }

    /// Sends `command` and decodes the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] / [`Error::Connection`] if the
    ///   connection is not open or drops while waiting
    /// - [`Error::RequestTimeout`] if no reply arrives within `timeout`
    /// - [`Error::Protocol`] if the reply does not match the command
    pub async fn request(&self, command: Command, timeout: Duration) -> Result<ResponseEnvelope> {
        let text = self.request_raw(command.as_str(), timeout).await?;
        ResponseEnvelope::decode(command, &text)
    }

    /// Sends a text frame and returns the next text frame received.
    ///
    /// The result slot is reset before sending. On timeout the slot stays
    /// armed: a reply that arrives later is kept until the next request
    /// resets it, or is handed to that request if it lands after the reset.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] / [`Error::Connection`] if the
    ///   connection is not open or drops while waiting
    /// - [`Error::RequestTimeout`] if no reply arrives within `timeout`
    pub async fn request_raw(&self, payload: &str, timeout: Duration) -> Result<String> {
        self.ensure_open()?;

        self.shared.send_modify(|s| s.slot = ResultSlot::Armed);
        let mut state_rx = self.shared.subscribe();

        self.command_tx
            .send(Outbound::Text(payload.to_owned()))
            .map_err(|_| Error::ConnectionClosed)?;
        trace!(payload, "Request queued");

        let waited = time::timeout(
            timeout,
            state_rx.wait_for(|s| s.slot.is_filled() || !s.state.is_connected()),
        )
        .await
        .map(|woken| woken.is_ok());

        match waited {
            Err(_) => {
                debug!(payload, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                return Err(Error::request_timeout(payload, timeout.as_millis() as u64));
            }
            Ok(false) => return Err(Error::ConnectionClosed),
            Ok(true) => {}
        }

        let mut reply = None;
        self.shared.send_if_modified(|s| {
            reply = s.slot.take();
            false
        });

        match reply {
            Some(text) => {
                trace!(payload, len = text.len(), "Reply claimed");
                Ok(text)
            }
            None => Err(self.closed_error()),
        }
    }

    /// Closes the connection and joins the I/O task.
    ///
    /// Waits up to the close timeout, then aborts the task. Idempotent and
    /// safe on a client that never started. Always ends `Disconnected`.
    pub async fn close(&self) {
        // A closed client can never be started.
        self.command_rx.lock().take();
        let _ = self.command_tx.send(Outbound::Shutdown);

        let handle = self.task.lock().take();
        if let Some(mut handle) = handle
            && time::timeout(self.close_timeout, &mut handle).await.is_err()
        {
            warn!(
                address = %self.target.address,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Connection task did not stop in time, aborting"
            );
            handle.abort();
        }

        self.shared.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.socket_open = false;
        });
        debug!(address = %self.target.address, "Client closed");
    }

    /// Returns `true` only if the connection is fully usable.
    ///
    /// All of these must hold: state is `Connected`, the socket is open, no
    /// error is latched, and the I/O task is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        let task_running = self
            .task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());

        let shared = self.shared.borrow();
        shared.state.is_connected() && shared.socket_open && shared.error.is_none() && task_running
    }
}

// ============================================================================
// TransportClient - Internal
// ============================================================================

impl TransportClient {
    fn ensure_open(&self) -> Result<()> {
        if self.shared.borrow().state.is_connected() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    /// The latched error if any, else [`Error::ConnectionClosed`].
    fn closed_error(&self) -> Error {
        match &self.shared.borrow().error {
            Some(reason) => Error::connection(reason.clone()),
            None => Error::ConnectionClosed,
        }
    }

    /// Handshake, then frame pump until close, error or shutdown.
    async fn run_event_loop(
        address: String,
        shared: SharedState,
        mut command_rx: mpsc::UnboundedReceiver<Outbound>,
    ) {
        let ws_stream = tokio::select! {
            result = connect_async(address.as_str()) => match result {
                Ok((stream, response)) => {
                    debug!(%address, status = %response.status(), "WebSocket handshake completed");
                    stream
                }
                Err(e) => {
                    warn!(%address, error = %e, "WebSocket handshake failed");
                    shared.send_modify(|s| s.on_error(e.to_string()));
                    return;
                }
            },

            command = command_rx.recv() => {
                debug!(?command, "Handshake cancelled");
                return;
            }
        };

        shared.send_modify(Shared::on_open);
        info!(%address, "Agent connection established");

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Frames from the agent
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Text frame received");
                            shared.send_modify(|s| s.on_message(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => shared.send_modify(|s| s.on_message(text)),
                            Err(_) => warn!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                        },

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by agent");
                            shared.send_modify(Shared::on_close);
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            shared.send_modify(|s| s.on_error(e.to_string()));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            shared.send_modify(Shared::on_close);
                            break;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                // Requests from the caller
                command = command_rx.recv() => {
                    match command {
                        Some(Outbound::Text(payload)) => {
                            if let Err(e) = ws_write.send(Message::Text(payload.into())).await {
                                error!(error = %e, "Failed to send request");
                                shared.send_modify(|s| s.on_error(e.to_string()));
                                break;
                            }
                            trace!("Request sent");
                        }

                        Some(Outbound::Shutdown) | None => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            shared.send_modify(Shared::on_close);
                            break;
                        }
                    }
                }
            }
        }

        debug!(%address, "Event loop terminated");
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take()
            && !handle.is_finished()
        {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
