//! Stream Registry
//!
//! Local mirror of the server's streams and the latest live payload per
//! stream. Listing and creation reload from the server; start, stop and
//! delete update the mirror in place once the server accepts them. Push
//! events are applied as they arrive.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::seams::{StreamControl, StreamMembership};
use crate::api::{
    ApiError, ApiResult, CreateStreamResponse, StreamConfig, StreamDescriptor, StreamId,
    StreamStatus, StreamStatusReport,
};
use crate::channel::{ChannelEvent, StreamFrame};

/// Latest live update for one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamPayload {
    /// Base64-encoded JPEG
    pub frame: String,
    pub ai_results: Value,
    pub fps: f64,
    /// Server capture time, seconds since epoch
    pub timestamp: f64,
    pub received_at: DateTime<Utc>,
}

impl StreamPayload {
    pub fn from_frame(frame: StreamFrame, received_at: DateTime<Utc>) -> (StreamId, Self) {
        let payload = Self {
            frame: frame.frame,
            ai_results: frame.ai_results,
            fps: frame.fps,
            timestamp: frame.timestamp,
            received_at,
        };
        (frame.stream_id, payload)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    streams: Vec<StreamDescriptor>,
    stream_data: HashMap<StreamId, StreamPayload>,
    loading: bool,
    error: Option<String>,
}

impl RegistryState {
    fn set_status(&mut self, id: &StreamId, status: StreamStatus) -> bool {
        match self.streams.iter_mut().find(|s| &s.id == id) {
            Some(stream) => {
                stream.status = status;
                true
            }
            None => false,
        }
    }
}

/// Stream registry
pub struct StreamStore {
    control: Arc<dyn StreamControl>,
    membership: Arc<dyn StreamMembership>,
    state: RwLock<RegistryState>,
}

impl StreamStore {
    pub fn new(control: Arc<dyn StreamControl>, membership: Arc<dyn StreamMembership>) -> Self {
        Self {
            control,
            membership,
            state: RwLock::new(RegistryState::default()),
        }
    }

    // ============================================
    // Control operations
    // ============================================

    /// Replace the whole stream set with the server's listing
    pub async fn load_streams(&self) -> ApiResult<()> {
        self.state.write().await.loading = true;

        let result = self.control.list_streams().await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(streams) => {
                debug!(count = streams.len(), "Loaded streams");
                state.streams = streams;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load streams");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Create a stream, then reload the full listing
    pub async fn add_stream(&self, config: &StreamConfig) -> ApiResult<CreateStreamResponse> {
        let created = match self.control.create_stream(config).await {
            Ok(created) => created,
            Err(e) => return Err(self.record(e).await),
        };
        info!(stream_id = %created.stream_id, name = %config.name, "Stream created");

        self.load_streams().await?;
        Ok(created)
    }

    /// Start processing; marks the stream active and joins its live updates
    pub async fn start_stream(&self, id: &StreamId) -> ApiResult<()> {
        if let Err(e) = self.control.start_stream(id).await {
            return Err(self.record(e).await);
        }

        if !self.state.write().await.set_status(id, StreamStatus::Active) {
            debug!(stream_id = %id, "Started stream not in registry");
        }
        self.membership.join_stream(id);

        info!(stream_id = %id, "Stream started");
        Ok(())
    }

    /// Stop processing; marks the stream inactive, leaves its live updates and
    /// drops the cached payload
    pub async fn stop_stream(&self, id: &StreamId) -> ApiResult<()> {
        if let Err(e) = self.control.stop_stream(id).await {
            return Err(self.record(e).await);
        }

        {
            let mut state = self.state.write().await;
            state.set_status(id, StreamStatus::Inactive);
            state.stream_data.remove(id);
        }
        self.membership.leave_stream(id);

        info!(stream_id = %id, "Stream stopped");
        Ok(())
    }

    /// Delete on the server, then forget the stream locally
    pub async fn delete_stream(&self, id: &StreamId) -> ApiResult<()> {
        if let Err(e) = self.control.delete_stream(id).await {
            return Err(self.record(e).await);
        }

        let mut state = self.state.write().await;
        state.streams.retain(|s| &s.id != id);
        state.stream_data.remove(id);

        info!(stream_id = %id, "Stream deleted");
        Ok(())
    }

    /// Server-side status report; the registry is not touched
    pub async fn stream_status(&self, id: &StreamId) -> ApiResult<StreamStatusReport> {
        match self.control.stream_status(id).await {
            Ok(report) => Ok(report),
            Err(e) => Err(self.record(e).await),
        }
    }

    async fn record(&self, error: ApiError) -> ApiError {
        warn!(error = %error, "Stream operation failed");
        self.state.write().await.error = Some(error.to_string());
        error
    }

    // ============================================
    // Push events
    // ============================================

    /// Apply one push event
    pub async fn apply(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::StreamData { frame, received_at } => {
                self.update_stream_data(frame, received_at).await
            }
            ChannelEvent::StreamError { stream_id, error } => {
                self.handle_stream_error(&stream_id, &error).await
            }
            ChannelEvent::StreamStopped { stream_id } => {
                self.handle_stream_stopped(&stream_id).await
            }
        }
    }

    /// Overwrite the cached payload for the frame's stream
    pub async fn update_stream_data(&self, frame: StreamFrame, received_at: DateTime<Utc>) {
        let (id, payload) = StreamPayload::from_frame(frame, received_at);
        self.state.write().await.stream_data.insert(id, payload);
    }

    pub async fn handle_stream_error(&self, id: &StreamId, error: &str) {
        warn!(stream_id = %id, error, "Stream reported an error");
        self.state.write().await.set_status(id, StreamStatus::Error);
    }

    pub async fn handle_stream_stopped(&self, id: &StreamId) {
        info!(stream_id = %id, "Stream stopped by server");
        let mut state = self.state.write().await;
        state.set_status(id, StreamStatus::Inactive);
        state.stream_data.remove(id);
    }

    // ============================================
    // Queries
    // ============================================

    pub async fn streams(&self) -> Vec<StreamDescriptor> {
        self.state.read().await.streams.clone()
    }

    pub async fn stream(&self, id: &StreamId) -> Option<StreamDescriptor> {
        self.state
            .read()
            .await
            .streams
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }

    pub async fn active_streams(&self) -> Vec<StreamDescriptor> {
        self.state
            .read()
            .await
            .streams
            .iter()
            .filter(|s| s.status == StreamStatus::Active)
            .cloned()
            .collect()
    }

    pub async fn stream_data(&self, id: &StreamId) -> Option<StreamPayload> {
        self.state.read().await.stream_data.get(id).cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }
}
