//! In-process agent used by tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How the agent answers one text frame.
pub(crate) enum Reply {
    Text(String),
    Delayed(Duration, String),
    Silent,
    Close,
}

type Responder = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

enum Mode {
    WebSocket(Responder),
    /// Accept TCP, then drop it before the upgrade.
    Reject,
    /// Accept TCP and never answer the upgrade.
    Stall,
}

pub(crate) struct MockAgent {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockAgent {
    pub(crate) async fn spawn(responder: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        Self::start(Mode::WebSocket(Arc::new(responder))).await
    }

    pub(crate) async fn rejecting() -> Self {
        Self::start(Mode::Reject).await
    }

    pub(crate) async fn stalling() -> Self {
        Self::start(Mode::Stall).await
    }

    pub(crate) fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// TCP connections accepted so far.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind mock agent");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let task = tokio::spawn(async move {
            let mut stalled = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                match &mode {
                    Mode::WebSocket(responder) => {
                        tokio::spawn(serve(stream, Arc::clone(responder)));
                    }
                    Mode::Reject => drop(stream),
                    Mode::Stall => stalled.push(stream),
                }
            }
        });

        Self {
            addr,
            accepted,
            task,
        }
    }
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, responder: Responder) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let sent = match responder(text.as_str()) {
            Reply::Text(body) => ws.send(Message::Text(body.into())).await,
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                ws.send(Message::Text(body.into())).await
            }
            Reply::Silent => Ok(()),
            Reply::Close => {
                let _ = ws.close(None).await;
                return;
            }
        };
        if sent.is_err() {
            return;
        }
    }
}

/// A `ws://` URL on a port nothing listens on.
pub(crate) async fn unused_ws_url() -> String {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}
