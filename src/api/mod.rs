//! Control API
//!
//! Request/response client for the monitoring server.
//!
//! # Endpoints
//!
//! ## Streams
//! - `GET /streams` - List all streams
//! - `POST /streams` - Create a stream
//! - `POST /streams/{id}/start` - Start processing a stream
//! - `POST /streams/{id}/stop` - Stop processing a stream
//! - `DELETE /streams/{id}` - Delete a stream
//! - `GET /streams/{id}/status` - Current stream status
//!
//! ## Alerts
//! - `GET /alerts/` - Paged alert list (`page`, `per_page`, `status`)
//! - `PATCH /alerts/{id}/status` - Update an alert's status
//! - `GET /alerts/{id}/replay` - Replay info for an alert
//!
//! ## Auth (under the configured auth prefix)
//! - `POST /login` - Exchange credentials for a bearer token
//! - `POST /signin` - Register an account
//!
//! A 401 from any endpoint clears the held credential.

mod client;
pub mod dto;
pub mod error;

pub use client::ApiClient;
pub use dto::{
    ActionResponse, Alert, AlertPage, AlertQuery, AlertReplay, CreateStreamResponse,
    Credentials, LoginResponse, Registration, StreamConfig, StreamDescriptor, StreamId,
    StreamStatus, StreamStatusReport,
};
pub use error::{ApiError, ApiResult};
