//! Control API Client
//!
//! HTTP client for the monitoring server's REST API: streams, alerts and
//! auth. Every request carries the held credential as a bearer token, and
//! any 401 response invalidates the session before the error is returned.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::dto::*;
use super::error::{ApiError, ApiResult};
use crate::config::ApiConfig;
use crate::session::Session;

/// Control API client
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a new client for the configured server
    pub fn new(config: &ApiConfig, session: Arc<Session>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ApiError::InvalidUrl(config.base_url.clone()));
        }

        let auth_path = config.auth_path.trim_matches('/');
        let auth_url = if auth_path.is_empty() {
            base_url.clone()
        } else {
            format!("{}/{}", base_url, auth_path)
        };

        Ok(Self {
            client,
            base_url,
            auth_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn stream_url(&self, id: &StreamId, action: Option<&str>) -> String {
        let id = urlencoding::encode(id.as_str());
        match action {
            Some(action) => self.url(&format!("/streams/{}/{}", id, action)),
            None => self.url(&format!("/streams/{}", id)),
        }
    }

    // ============================================
    // Streams
    // ============================================

    /// `GET /streams`
    pub async fn list_streams(&self) -> ApiResult<Vec<StreamDescriptor>> {
        self.send_json(self.client.get(self.url("/streams"))).await
    }

    /// `POST /streams`
    pub async fn create_stream(&self, config: &StreamConfig) -> ApiResult<CreateStreamResponse> {
        self.send_json(self.client.post(self.url("/streams")).json(config))
            .await
    }

    /// `POST /streams/{id}/start`
    pub async fn start_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        self.send_json(self.client.post(self.stream_url(id, Some("start"))))
            .await
    }

    /// `POST /streams/{id}/stop`
    pub async fn stop_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        self.send_json(self.client.post(self.stream_url(id, Some("stop"))))
            .await
    }

    /// `DELETE /streams/{id}`
    pub async fn delete_stream(&self, id: &StreamId) -> ApiResult<ActionResponse> {
        self.send_json(self.client.delete(self.stream_url(id, None)))
            .await
    }

    /// `GET /streams/{id}/status`
    pub async fn stream_status(&self, id: &StreamId) -> ApiResult<StreamStatusReport> {
        self.send_json(self.client.get(self.stream_url(id, Some("status"))))
            .await
    }

    // ============================================
    // Alerts
    // ============================================

    /// `GET /alerts/?page=&per_page=&status=`
    pub async fn list_alerts(&self, query: &AlertQuery) -> ApiResult<AlertPage> {
        self.send_json(self.client.get(self.url("/alerts/")).query(query))
            .await
    }

    /// `PATCH /alerts/{id}/status`
    pub async fn update_alert_status(&self, id: i64, status: &str) -> ApiResult<Alert> {
        let url = self.url(&format!("/alerts/{}/status", id));
        self.send_json(self.client.patch(url).json(&AlertStatusUpdate { status }))
            .await
    }

    /// `GET /alerts/{id}/replay`
    pub async fn alert_replay(&self, id: i64) -> ApiResult<AlertReplay> {
        let url = self.url(&format!("/alerts/{}/replay", id));
        self.send_json(self.client.get(url)).await
    }

    // ============================================
    // Auth
    // ============================================

    /// `POST {auth}/login`
    ///
    /// Returns the success status and, for a 200, the token body.
    pub async fn login(
        &self,
        credentials: &Credentials,
    ) -> ApiResult<(StatusCode, Option<LoginResponse>)> {
        let url = format!("{}/login", self.auth_url);
        let response = self.send(self.client.post(url).json(credentials)).await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Ok((status, None));
        }

        let body = decode::<LoginResponse>(response).await?;
        Ok((status, Some(body)))
    }

    /// `POST {auth}/signin`
    pub async fn register(&self, registration: &Registration) -> ApiResult<StatusCode> {
        let url = format!("{}/signin", self.auth_url);
        let response = self.send(self.client.post(url).json(registration)).await?;
        Ok(response.status())
    }

    // ============================================
    // Plumbing
    // ============================================

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.send(request).await?;
        decode(response).await
    }

    /// Attach the credential, send, and map failures
    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request = match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(ErrorBody::message)
                .unwrap_or(text);

            tracing::debug!(status = status.as_u16(), message = %message, "API request failed");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await.map_err(ApiError::from_transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryCredentialStorage;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, patch, post},
        Json, Router,
    };
    use std::collections::HashMap;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    fn client_with(base_url: String, token: Option<&str>) -> (ApiClient, Arc<Session>) {
        let storage = match token {
            Some(t) => MemoryCredentialStorage::with_token(t),
            None => MemoryCredentialStorage::new(),
        };
        let session = Arc::new(Session::new(Box::new(storage)).unwrap());
        let config = ApiConfig {
            base_url,
            ..ApiConfig::default()
        };
        (ApiClient::new(&config, Arc::clone(&session)).unwrap(), session)
    }

    #[test]
    fn test_rejects_non_http_base() {
        let session = Arc::new(Session::new(Box::new(MemoryCredentialStorage::new())).unwrap());
        let config = ApiConfig {
            base_url: "ftp://example".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            ApiClient::new(&config, session),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let router = Router::new().route(
            "/api/streams",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if auth == "Bearer T" {
                    Json(serde_json::json!([{"id": 1, "status": "inactive"}]))
                } else {
                    Json(serde_json::json!([]))
                }
            }),
        );
        let base = spawn_server(router).await;

        let (client, _) = client_with(base.clone(), Some("T"));
        let streams = client.list_streams().await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].id, StreamId::from(1));

        let (anonymous, _) = client_with(base, None);
        assert!(anonymous.list_streams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential() {
        let router = Router::new().route(
            "/api/streams",
            get(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "expired"})),
                )
            }),
        );
        let base = spawn_server(router).await;
        let (client, session) = client_with(base, Some("stale"));
        let mut events = session.subscribe();

        let err = client.list_streams().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!session.is_authenticated().await);
        assert_eq!(
            events.recv().await.unwrap(),
            crate::session::SessionEvent::LoginRequired
        );
    }

    #[tokio::test]
    async fn test_error_body_surfaces_message() {
        let router = Router::new().route(
            "/api/streams/:id/start",
            post(|Path(id): Path<String>| async move {
                (
                    AxumStatus::NOT_FOUND,
                    Json(serde_json::json!({"detail": format!("stream {} missing", id)})),
                )
            }),
        );
        let base = spawn_server(router).await;
        let (client, session) = client_with(base, Some("T"));

        let err = client.start_stream(&StreamId::from("abc")).await.unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "stream abc missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Only 401 touches the credential
        assert!(session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_alert_endpoints() {
        let router = Router::new()
            .route(
                "/api/alerts/",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    Json(serde_json::json!({
                        "alerts": [{
                            "id": 7,
                            "timestamp": "2024-05-01T10:00:00Z",
                            "event_type": "danger_zone",
                            "details": params.get("status").cloned(),
                            "status": "unprocessed"
                        }],
                        "total": 1,
                        "pages": 1,
                        "current_page": params.get("page").and_then(|p| p.parse::<u64>().ok()).unwrap_or(0)
                    }))
                }),
            )
            .route(
                "/api/alerts/:id/status",
                patch(
                    |Path(id): Path<i64>, Json(body): Json<serde_json::Value>| async move {
                        Json(serde_json::json!({
                            "id": id,
                            "timestamp": "2024-05-01T10:00:00Z",
                            "event_type": "danger_zone",
                            "status": body["status"]
                        }))
                    },
                ),
            );
        let base = spawn_server(router).await;
        let (client, _) = client_with(base, Some("T"));

        let page = client
            .list_alerts(&AlertQuery::default().page(2).status("unprocessed"))
            .await
            .unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.alerts[0].details.as_deref(), Some("unprocessed"));

        let alert = client.update_alert_status(7, "resolved").await.unwrap();
        assert_eq!(alert.id, 7);
        assert_eq!(alert.status, "resolved");
    }

    #[tokio::test]
    async fn test_decode_error() {
        let router = Router::new().route("/api/streams", get(|| async { "not json" }));
        let base = spawn_server(router).await;
        let (client, _) = client_with(base, None);

        assert!(matches!(
            client.list_streams().await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (client, _) = client_with("http://127.0.0.1:9/api".to_string(), None);
        let err = client.list_streams().await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable | ApiError::Request(_)));
    }
}
