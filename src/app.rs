//! Application State
//!
//! One owned object that wires the session, control API, push channel and
//! stream registry together. Push events are applied to the registry by a
//! single pump task in the order the channel received them.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::channel::{
    ChannelError, ChannelEvent, ChannelOptions, PushChannel, Transport, WebSocketTransport,
};
use crate::config::Config;
use crate::registry::StreamStore;
use crate::session::{
    CredentialStorage, FileCredentialStorage, Session, SessionError, SessionStore,
};

/// Errors raised while assembling the application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Push channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Wired application state
pub struct App {
    config: Config,
    session: Arc<Session>,
    api: Arc<ApiClient>,
    auth: SessionStore,
    channel: PushChannel,
    streams: Arc<StreamStore>,
    updates: broadcast::Sender<ChannelEvent>,
    pump: JoinHandle<()>,
}

impl App {
    /// Build from config with file-backed credentials and a websocket channel
    pub fn new(config: Config) -> Result<Self, AppError> {
        let storage = FileCredentialStorage::new(config.session.credentials_path());
        let transport = WebSocketTransport::new(&config.socket.url)?;
        Self::with_parts(config, Box::new(storage), Arc::new(transport))
    }

    /// Build with explicit credential storage and push transport
    pub fn with_parts(
        config: Config,
        storage: Box<dyn CredentialStorage>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, AppError> {
        let session = Arc::new(Session::new(storage)?);
        let api = Arc::new(ApiClient::new(&config.api, session.clone())?);
        let auth = SessionStore::new(api.clone(), session.clone());

        let (channel, events) =
            PushChannel::spawn(transport, ChannelOptions::from_config(&config.socket));
        let streams = Arc::new(StreamStore::new(api.clone(), Arc::new(channel.clone())));

        let (updates, _) = broadcast::channel(256);
        let pump = tokio::spawn(run_pump(events, streams.clone(), updates.clone()));

        debug!(api = %api.base_url(), socket = %config.socket.url, "Application state ready");

        Ok(Self {
            config,
            session,
            api,
            auth,
            channel,
            streams,
            updates,
            pump,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Control API, including the alert endpoints
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn auth(&self) -> &SessionStore {
        &self.auth
    }

    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    pub fn streams(&self) -> &Arc<StreamStore> {
        &self.streams
    }

    /// Push events, published after the registry has applied them
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ChannelEvent> {
        self.updates.subscribe()
    }

    /// Disconnect the push channel and stop the pump
    pub fn shutdown(self) {
        let _ = self.channel.disconnect();
        self.pump.abort();
        info!("Application shut down");
    }
}

async fn run_pump(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    streams: Arc<StreamStore>,
    updates: broadcast::Sender<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        streams.apply(event.clone()).await;
        // Nobody listening is fine
        let _ = updates.send(event);
    }

    debug!("Event pump stopped");
}
