//! Push Channel Message Types
//!
//! Events exchanged on the `/video` namespace between the client and the
//! monitoring server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::ProtocolError;
use crate::api::StreamId;

/// Live frame plus analysis results for one stream
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamFrame {
    pub stream_id: StreamId,
    /// Base64-encoded JPEG
    #[serde(default)]
    pub frame: String,
    #[serde(default)]
    pub ai_results: Value,
    #[serde(default)]
    pub fps: f64,
    /// Server capture time, seconds since epoch
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamErrorPayload {
    stream_id: StreamId,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamRef {
    stream_id: StreamId,
}

/// Events emitted by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    StreamData(StreamFrame),
    StreamError { stream_id: StreamId, error: String },
    StreamStopped { stream_id: StreamId },
    /// Namespace greeting
    Connected,
    JoinedStream { stream_id: StreamId },
    LeftStream { stream_id: StreamId },
    /// Anything this client does not act on
    Other { name: String },
}

impl ServerEvent {
    /// Interpret a Socket.IO event by name
    pub fn parse(name: &str, data: Value) -> Result<Self, ProtocolError> {
        let event = match name {
            "stream_data" => ServerEvent::StreamData(serde_json::from_value(data)?),
            "stream_error" => {
                let payload: StreamErrorPayload = serde_json::from_value(data)?;
                ServerEvent::StreamError {
                    stream_id: payload.stream_id,
                    error: payload.error,
                }
            }
            "stream_stopped" => {
                let payload: StreamRef = serde_json::from_value(data)?;
                ServerEvent::StreamStopped {
                    stream_id: payload.stream_id,
                }
            }
            "connected" => ServerEvent::Connected,
            "joined_stream" => {
                let payload: StreamRef = serde_json::from_value(data)?;
                ServerEvent::JoinedStream {
                    stream_id: payload.stream_id,
                }
            }
            "left_stream" => {
                let payload: StreamRef = serde_json::from_value(data)?;
                ServerEvent::LeftStream {
                    stream_id: payload.stream_id,
                }
            }
            other => ServerEvent::Other {
                name: other.to_string(),
            },
        };
        Ok(event)
    }

    /// The registry-facing event, if this one mutates stream state
    pub fn into_channel_event(self, received_at: DateTime<Utc>) -> Option<ChannelEvent> {
        match self {
            ServerEvent::StreamData(frame) => Some(ChannelEvent::StreamData { frame, received_at }),
            ServerEvent::StreamError { stream_id, error } => {
                Some(ChannelEvent::StreamError { stream_id, error })
            }
            ServerEvent::StreamStopped { stream_id } => {
                Some(ChannelEvent::StreamStopped { stream_id })
            }
            _ => None,
        }
    }
}

/// Stream events delivered to the reconciliation side, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StreamData {
        frame: StreamFrame,
        /// Stamped once when the event is decoded
        received_at: DateTime<Utc>,
    },
    StreamError {
        stream_id: StreamId,
        error: String,
    },
    StreamStopped {
        stream_id: StreamId,
    },
}

impl ChannelEvent {
    pub fn stream_id(&self) -> &StreamId {
        match self {
            ChannelEvent::StreamData { frame, .. } => &frame.stream_id,
            ChannelEvent::StreamError { stream_id, .. }
            | ChannelEvent::StreamStopped { stream_id } => stream_id,
        }
    }
}

/// Membership messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinStream(StreamId),
    LeaveStream(StreamId),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinStream(_) => "join_stream",
            ClientEvent::LeaveStream(_) => "leave_stream",
        }
    }

    pub fn payload(&self) -> Value {
        let (ClientEvent::JoinStream(id) | ClientEvent::LeaveStream(id)) = self;
        serde_json::json!({ "stream_id": id })
    }
}
