//! One WebSocket connection to one relay.
//!
//! Outgoing messages go through a shared sink. A spawned dispatch loop
//! parses incoming text frames and forwards them, tagged with the relay URL,
//! into a channel shared by every connection of a pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use bunker_core::{BunkerError, BunkerResult};

use crate::wire::{ClientMessage, RelayMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// A relay message together with the relay it came from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub relay: String,
    pub message: RelayMessage,
}

pub struct RelayConnection {
    url: String,
    sink: Arc<Mutex<WsSink>>,
    connected: Arc<AtomicBool>,
    dispatch_handle: tokio::task::JoinHandle<()>,
}

impl RelayConnection {
    /// Connect and start forwarding parsed messages into `inbound`.
    pub async fn connect(url: &str, inbound: mpsc::Sender<Inbound>) -> BunkerResult<Self> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| BunkerError::Transport(format!("cannot connect to {url}: {e}")))?;
        info!(relay = %url, "relay connected");

        let (sink, read) = ws.split();
        let sink = Arc::new(Mutex::new(sink));
        let connected = Arc::new(AtomicBool::new(true));

        let dispatch_handle = {
            let url = url.to_string();
            let sink = sink.clone();
            let connected = connected.clone();
            tokio::spawn(async move {
                Self::dispatch_loop(url, read, inbound, sink).await;
                connected.store(false, Ordering::SeqCst);
            })
        };

        Ok(Self {
            url: url.to_string(),
            sink,
            connected,
            dispatch_handle,
        })
    }

    async fn dispatch_loop(
        url: String,
        mut read: SplitStream<WsStream>,
        inbound: mpsc::Sender<Inbound>,
        sink: Arc<Mutex<WsSink>>,
    ) {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Ping(payload)) => {
                    let _ = sink.lock().await.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(Message::Close(_)) => {
                    debug!(relay = %url, "close frame received");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(relay = %url, error = %e, "relay read error");
                    break;
                }
            };

            let message = match RelayMessage::parse(&text) {
                Ok(message) => message,
                Err(e) => {
                    debug!(relay = %url, error = %e, "ignoring relay frame");
                    continue;
                }
            };

            let forwarded = Inbound {
                relay: url.clone(),
                message,
            };
            if inbound.send(forwarded).await.is_err() {
                debug!(relay = %url, "inbound channel closed");
                break;
            }
        }
        info!(relay = %url, "relay disconnected");
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn send(&self, message: &ClientMessage) -> BunkerResult<()> {
        let text = message.to_json()?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| BunkerError::Transport(format!("send to {} failed: {e}", self.url)))
    }

    pub async fn close(&self) {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
        self.connected.store(false, Ordering::SeqCst);
        self.dispatch_handle.abort();
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
    }
}
