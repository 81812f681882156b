//! Data Transfer Objects
//!
//! Request and response types exchanged with the monitoring server.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// STREAM DTOs
// ============================================

/// Server-assigned stream identifier
///
/// The server issues UUID strings, but integer ids are accepted on the
/// wire and kept as their decimal string so both compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => StreamId(s),
            Raw::Integer(n) => StreamId(n.to_string()),
        })
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StreamId(s.to_string()))
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        StreamId(s.to_string())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        StreamId(s)
    }
}

impl From<i64> for StreamId {
    fn from(n: i64) -> Self {
        StreamId(n.to_string())
    }
}

/// Lifecycle status of a stream as known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Inactive,
    Active,
    Error,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamStatus::Inactive => "inactive",
            StreamStatus::Active => "active",
            StreamStatus::Error => "error",
        };
        f.pad(s)
    }
}

/// A stream known to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Unique, server-assigned id
    pub id: StreamId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Source URL of the stream
    #[serde(default)]
    pub rtmp_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Analysis modes enabled on the server for this stream
    #[serde(default)]
    pub detection_modes: Vec<String>,
    #[serde(default)]
    pub status: StreamStatus,
    /// Server-local creation time, kept verbatim
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_activity: Option<String>,
}

impl StreamDescriptor {
    /// Minimal descriptor, mainly useful for tests and fixtures
    pub fn new(id: impl Into<StreamId>, status: StreamStatus) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            rtmp_url: None,
            description: None,
            detection_modes: Vec::new(),
            status,
            created_at: None,
            last_activity: None,
        }
    }
}

/// Stream creation request
#[derive(Debug, Clone, Serialize)]
pub struct StreamConfig {
    pub name: String,
    pub rtmp_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub detection_modes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub danger_zones: Option<Vec<serde_json::Value>>,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, rtmp_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rtmp_url: rtmp_url.into(),
            description: None,
            detection_modes: vec!["object_detection".to_string()],
            danger_zones: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn detection_modes(mut self, modes: Vec<String>) -> Self {
        self.detection_modes = modes;
        self
    }

    pub fn danger_zones(mut self, zones: Vec<serde_json::Value>) -> Self {
        self.danger_zones = Some(zones);
        self
    }
}

/// Response to a stream creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamResponse {
    pub stream_id: StreamId,
    #[serde(default)]
    pub status: String,
}

/// Response to start/stop/delete requests ("started", "stopped", "deleted")
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub status: String,
}

/// Current status of a single stream as reported by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatusReport {
    #[serde(default)]
    pub stream_id: Option<StreamId>,
    pub status: String,
    /// Any additional server-provided fields
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

// ============================================
// ALERT DTOs
// ============================================

/// An alert raised by the server's analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub details: Option<String>,
    /// "unprocessed", "viewed", "resolved", or any other server string
    pub status: String,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub frame_snapshot_path: Option<String>,
}

/// One page of alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPage {
    pub alerts: Vec<Alert>,
    pub total: u64,
    pub pages: u64,
    pub current_page: u64,
}

/// Query parameters for listing alerts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertQuery {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            status: None,
        }
    }
}

impl AlertQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AlertStatusUpdate<'a> {
    pub status: &'a str,
}

/// Replay information for an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReplay {
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub frame_snapshot_path: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================
// AUTH DTOs
// ============================================

/// Login credentials
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Successful login response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Registration payload
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Server error body: `{"error": ..}` (Flask) or `{"detail": ..}` (FastAPI)
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(self) -> Option<String> {
        if let Some(error) = self.error {
            return Some(error);
        }
        self.detail.map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
