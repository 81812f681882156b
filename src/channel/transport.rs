//! Push Channel Transport
//!
//! The channel task never touches a socket directly. It asks a [`Transport`]
//! for a [`Link`], a pair of text-frame queues, and treats the inbound queue
//! closing as the connection dropping.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::ChannelError;

/// Socket.IO endpoint path appended to the server URL
pub const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// An open connection as two text-frame queues
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    /// Yields `None` once the connection is gone
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl Link {
    /// Build a link from raw queue halves
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, frame: String) -> Result<(), ChannelError> {
        self.outbound.send(frame).map_err(|_| ChannelError::Closed)
    }
}

/// Opens links to the push server
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self) -> Result<Link, ChannelError>;
}

/// Websocket transport for a Socket.IO server
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// `server_url` may use http(s) or ws(s)
    pub fn new(server_url: &str) -> Result<Self, ChannelError> {
        let trimmed = server_url.trim_end_matches('/');
        let base = if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else {
            return Err(ChannelError::InvalidUrl(server_url.to_string()));
        };

        Ok(Self {
            endpoint: format!("{}{}", base, SOCKET_IO_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<Link, ChannelError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        debug!(endpoint = %self.endpoint, "Websocket opened");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (mut sink, mut stream) = ws.split();

            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(text) = outgoing else {
                            // Link dropped by the channel task
                            let _ = sink.close().await;
                            break;
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!(error = %e, "Websocket send failed");
                            break;
                        }
                    }
                    incoming = stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text).is_err() {
                                    let _ = sink.close().await;
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "Websocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "Websocket receive failed");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            // in_tx drops here, which the channel task sees as a disconnect
        });

        Ok(Link::new(out_tx, in_rx))
    }
}
