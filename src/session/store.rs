//! Session Store
//!
//! Holds the bearer credential and exposes the login, register and logout
//! flows. [`Session`] is the shared credential holder every request reads
//! from; [`SessionStore`] drives the auth exchanges against the server.

use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::storage::CredentialStorage;
use super::SessionError;
use crate::api::{ApiClient, Credentials, Registration};

/// Signals published by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A credential was stored after a successful login
    LoggedIn,
    /// The credential was cleared by an explicit logout
    LoggedOut,
    /// The server rejected the credential; the user must log in again
    LoginRequired,
}

/// Shared credential holder
///
/// Reads and replacements go through an async lock so the session can be
/// shared across tasks.
pub struct Session {
    token: RwLock<Option<String>>,
    storage: Box<dyn CredentialStorage>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a session, restoring any persisted credential
    ///
    /// Unreadable storage starts the session logged out, so logout and login
    /// can still repair it.
    pub fn new(storage: Box<dyn CredentialStorage>) -> Result<Self, SessionError> {
        let token = match storage.load() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not restore persisted credential");
                None
            }
        };
        let (events, _) = broadcast::channel(16);

        if token.is_some() {
            tracing::debug!("Restored persisted credential");
        }

        Ok(Self {
            token: RwLock::new(token),
            storage,
            events,
        })
    }

    /// The currently held credential, if any
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// True iff a credential is currently held
    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Store a credential in memory and durable storage
    pub async fn set_token(&self, token: String) -> Result<(), SessionError> {
        let mut guard = self.token.write().await;
        self.storage.store(&token)?;
        *guard = Some(token);
        Ok(())
    }

    /// Clear the credential from memory and durable storage
    ///
    /// The in-memory credential is dropped even if storage fails.
    pub async fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self.token.write().await;
        *guard = None;
        self.storage.clear()
    }

    /// Handle an authorization failure from any endpoint
    pub async fn invalidate(&self) {
        if let Err(e) = self.clear().await {
            tracing::error!(error = %e, "Failed to clear persisted credential");
        }
        tracing::warn!("Credential rejected by server, login required");
        let _ = self.events.send(SessionEvent::LoginRequired);
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Authentication flows against the server
pub struct SessionStore {
    api: Arc<ApiClient>,
    session: Arc<Session>,
}

impl SessionStore {
    pub fn new(api: Arc<ApiClient>, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Exchange credentials for a token
    ///
    /// Returns true and stores the token on a 200 response; any other
    /// success status returns false and leaves the session untouched.
    pub async fn login(&self, credentials: &Credentials) -> Result<bool, SessionError> {
        let (status, body) = self.api.login(credentials).await?;

        if status != StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "Login returned unexpected status");
            return Ok(false);
        }

        let Some(body) = body else {
            return Ok(false);
        };

        self.session.set_token(body.access_token).await?;
        self.session.publish(SessionEvent::LoggedIn);

        tracing::info!(
            username = %credentials.username,
            user_id = body.user_id.as_deref().unwrap_or("-"),
            "Logged in"
        );
        Ok(true)
    }

    /// Register a new account; true iff the server created it
    pub async fn register(&self, registration: &Registration) -> Result<bool, SessionError> {
        let status = self.api.register(registration).await?;
        let created = status == StatusCode::CREATED;

        if created {
            tracing::info!(username = %registration.username, "Registered account");
        } else {
            tracing::warn!(status = status.as_u16(), "Registration returned unexpected status");
        }
        Ok(created)
    }

    /// Clear the credential unconditionally
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.session.clear().await?;
        self.session.publish(SessionEvent::LoggedOut);
        tracing::info!("Logged out");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }
}
