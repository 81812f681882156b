//! Registry Dependencies
//!
//! The registry talks to the control API and the push channel through these
//! traits so it can be driven by in-memory doubles in tests.

use async_trait::async_trait;
use tracing::debug;

use crate::api::{
    ActionResponse, ApiClient, ApiResult, CreateStreamResponse, StreamConfig, StreamDescriptor,
    StreamId, StreamStatusReport,
};
use crate::channel::PushChannel;

/// Server-side stream operations
#[async_trait]
pub trait StreamControl: Send + Sync {
    async fn list_streams(&self) -> ApiResult<Vec<StreamDescriptor>>;
    async fn create_stream(&self, config: &StreamConfig) -> ApiResult<CreateStreamResponse>;
    async fn start_stream(&self, id: &StreamId) -> ApiResult<ActionResponse>;
    async fn stop_stream(&self, id: &StreamId) -> ApiResult<ActionResponse>;
    async fn delete_stream(&self, id: &StreamId) -> ApiResult<ActionResponse>;
    async fn stream_status(&self, id: &StreamId) -> ApiResult<StreamStatusReport>;
}

/// Live update membership, fire and forget
pub trait StreamMembership: Send + Sync {
    fn join_stream(&self, id: &StreamId);
    fn leave_stream(&self, id: &StreamId);
}

#[async_trait]
impl StreamControl for ApiClient {
    async fn list_streams(&self) -> ApiResult<Vec<StreamDescriptor>> {
        ApiClient::list_streams(self).await
    }

    async fn create_stream(&self, config: &StreamConfig) -> ApiResult<CreateStreamResponse> {
        ApiClient::create_stream(self, config).await
    }

    async fn start_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        ApiClient::start_stream(self, id).await
    }

    async fn stop_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        ApiClient::stop_stream(self, id).await
    }

    async fn delete_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        ApiClient::delete_stream(self, id).await
    }

    async fn stream_status(&self, id: &StreamId) -> ApiResult<StreamStatusReport> {
        ApiClient::stream_status(self, id).await
    }
}

impl StreamMembership for PushChannel {
    fn join_stream(&self, id: &StreamId) {
        if let Err(e) = PushChannel::join_stream(self, id) {
            debug!(stream_id = %id, error = %e, "Join not sent");
        }
    }

    fn leave_stream(&self, id: &StreamId) {
        if let Err(e) = PushChannel::leave_stream(self, id) {
            debug!(stream_id = %id, error = %e, "Leave not sent");
        }
    }
}
