//! Session
//!
//! Authentication state for the client.
//!
//! - **Storage**: durable credential persistence under a fixed key
//! - **Session**: the shared credential holder read by every request
//! - **SessionStore**: login, register and logout exchanges
//!
//! Any authorization failure seen by the control API clears the credential
//! and publishes [`SessionEvent::LoginRequired`].

mod storage;
mod store;

pub use storage::{
    default_credentials_path, CredentialStorage, FileCredentialStorage, MemoryCredentialStorage,
    CREDENTIAL_KEY,
};
pub use store::{Session, SessionEvent, SessionStore};

use thiserror::Error;

/// Errors from the session layer
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}
