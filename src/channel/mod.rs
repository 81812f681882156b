//! Push Channel
//!
//! Long-lived Socket.IO connection to the server's `/video` namespace that
//! delivers live frames and stream state changes.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ack──▶ Connected
//!      ▲                        │                   │
//!      │◀──── failure, retry ───┘◀──── dropped ─────┘
//!      │
//!   (max attempts) ──▶ Failed ──connect──▶ Connecting
//! ```
//!
//! Retries wait `base_delay * attempt` and stop after `max_attempts`.

mod backoff;
mod client;
pub mod messages;
pub mod protocol;
mod transport;

pub use backoff::{
    Backoff, ChannelState, ChannelStatus, ReconnectDecision, ReconnectPolicy,
};
pub use client::{ChannelOptions, PushChannel};
pub use messages::{ChannelEvent, ClientEvent, ServerEvent, StreamFrame};
pub use protocol::ProtocolError;
pub use transport::{Link, Transport, WebSocketTransport, SOCKET_IO_PATH};

use thiserror::Error;

/// Push channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Push channel is closed")]
    Closed,

    #[error("Invalid push server URL: {0}")]
    InvalidUrl(String),
}
