//! Push Channel Wire Protocol
//!
//! Engine.IO v4 text packets carrying Socket.IO v5 packets, one per
//! websocket text frame.
//!
//! ```text
//! engine:  <type>[payload]          0 open, 1 close, 2 ping, 3 pong, 4 message
//! socket:  <type>[nsp,][ack][json]  0 connect, 1 disconnect, 2 event, 3 ack,
//!                                   4 connect error
//! ```
//!
//! Binary attachments (socket types 5 and 6) are not used by the server's
//! `/video` namespace and are rejected.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Engine.IO handshake sent by the server on open
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// How long the connection may stay silent before it is considered dead
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// A decoded Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    /// Upgrade and noop packets, which carry nothing for a websocket client
    Noop,
}

/// A decoded Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        /// First argument of the event, `Null` when absent
        data: Value,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        data: Value,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }
}

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown engine packet type: {0:?}")]
    UnknownEngineType(char),

    #[error("Unknown socket packet type: {0:?}")]
    UnknownSocketType(char),

    #[error("Binary packets are not supported")]
    BinaryUnsupported,

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Malformed packet: {0}")]
    Malformed(String),
}

// ============================================
// Decoding
// ============================================

/// Decode one websocket text frame
pub fn decode(frame: &str) -> Result<Packet, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let payload = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(payload)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(payload.to_string())),
        '3' => Ok(Packet::Pong(payload.to_string())),
        '4' => Ok(Packet::Message(decode_socket(payload)?)),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(ProtocolError::UnknownEngineType(other)),
    }
}

fn decode_socket(packet: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();

    if kind == '5' || kind == '6' {
        return Err(ProtocolError::BinaryUnsupported);
    }

    let (namespace, rest) = split_namespace(rest);
    let (ack_id, body) = split_ack_id(rest)?;

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            data: parse_optional(body)?,
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let (name, data) = parse_event_args(body)?;
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                data,
            })
        }
        '3' => {
            let ack_id = ack_id.ok_or_else(|| ProtocolError::Malformed("ack without id".into()))?;
            let mut args: Vec<Value> = serde_json::from_str(body)?;
            let data = if args.is_empty() {
                Value::Null
            } else {
                args.swap_remove(0)
            };
            Ok(SocketPacket::Ack {
                namespace,
                ack_id,
                data,
            })
        }
        '4' => {
            let message = match parse_optional(body)? {
                Some(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connect error")
                    .to_string(),
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "connect error".to_string(),
            };
            Ok(SocketPacket::ConnectError { namespace, message })
        }
        other => Err(ProtocolError::UnknownSocketType(other)),
    }
}

/// Split off `/nsp,`; a packet without one addresses the root namespace
fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return ("/".to_string(), rest);
    }
    match rest.find(',') {
        Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn split_ack_id(rest: &str) -> Result<(Option<u64>, &str), ProtocolError> {
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let id = rest[..digits]
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("bad ack id {:?}", &rest[..digits])))?;
    Ok((Some(id), &rest[digits..]))
}

fn parse_optional(body: &str) -> Result<Option<Value>, ProtocolError> {
    if body.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(body)?))
    }
}

fn parse_event_args(body: &str) -> Result<(String, Value), ProtocolError> {
    let args: Vec<Value> = serde_json::from_str(body)?;
    let mut args = args.into_iter();

    let name = match args.next() {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(ProtocolError::Malformed(format!(
                "event name is not a string: {}",
                other
            )))
        }
        None => return Err(ProtocolError::Malformed("event without name".into())),
    };

    Ok((name, args.next().unwrap_or(Value::Null)))
}

// ============================================
// Encoding
// ============================================

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// `40/nsp,`
pub fn encode_connect(namespace: &str) -> String {
    format!("40{}", namespace_prefix(namespace))
}

/// `41/nsp,`
pub fn encode_disconnect(namespace: &str) -> String {
    format!("41{}", namespace_prefix(namespace))
}

/// `42/nsp,["name",data]`
pub fn encode_event(namespace: &str, name: &str, data: &Value) -> String {
    let args = Value::Array(vec![Value::String(name.to_string()), data.clone()]);
    format!("42{}{}", namespace_prefix(namespace), args)
}

/// Engine.IO pong echoing the ping payload
pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}
