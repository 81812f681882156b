//! Control API Error Types
//!
//! Errors returned by the control API client. An authorization failure is
//! its own variant because it carries a cross-cutting side effect: the held
//! credential is cleared and a login is required.

use thiserror::Error;

/// Errors that can occur when talking to the control API
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server rejected the credential (HTTP 401)
    #[error("Unauthorized: login required")]
    Unauthorized,

    /// The server answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Server unavailable")]
    Unavailable,

    /// A success response whose body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Classify a transport-level reqwest failure
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Unavailable
        } else {
            ApiError::Request(err)
        }
    }

    /// True for the authorization-failure kind
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for control API operations
pub type ApiResult<T> = Result<T, ApiError>;
