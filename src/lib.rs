//! # Realtime Monitor
//!
//! Client for a real-time video monitoring server: authenticate, manage
//! streams, triage alerts and mirror live frames with their AI analysis.
//!
//! ## Modules
//!
//! - [`session`]: Credential persistence and the login/register/logout flows
//! - [`api`]: HTTP client for streams, alerts and auth
//! - [`channel`]: Socket.IO push channel with linear-backoff reconnect
//! - [`registry`]: Local stream set and latest live payload per stream
//! - [`app`]: Owned application state wiring everything together
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realtime_monitor::{App, Config, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::new(Config::load_default())?;
//!
//!     if !app.auth().login(&Credentials::new("operator", "secret")).await? {
//!         return Err("login rejected".into());
//!     }
//!
//!     app.streams().load_streams().await?;
//!     app.channel().connect()?;
//!
//!     let mut updates = app.subscribe_updates();
//!     while let Ok(event) = updates.recv().await {
//!         println!("update for {}", event.stream_id());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod channel;
pub mod config;
pub mod registry;
pub mod session;

// Re-export top-level types for convenience
pub use api::{
    Alert, AlertPage, AlertQuery, AlertReplay, ApiClient, ApiError, ApiResult, Credentials,
    Registration, StreamConfig, StreamDescriptor, StreamId, StreamStatus,
};

pub use app::{App, AppError};

pub use channel::{
    ChannelError, ChannelEvent, ChannelOptions, ChannelState, ChannelStatus, PushChannel,
    ReconnectPolicy, StreamFrame, Transport, WebSocketTransport,
};

pub use config::{Config, ConfigError, LoggingConfig};

pub use registry::{StreamControl, StreamMembership, StreamPayload, StreamStore};

pub use session::{
    CredentialStorage, FileCredentialStorage, Session, SessionError, SessionEvent, SessionStore,
};
