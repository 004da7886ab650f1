//! # API Client
//!
//! Every REST call goes through [`ApiClient::request`], which wraps the
//! transport with the interceptor behaviour the rest of the engine relies on.
//!
//! ## Interceptor Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  request(POST /sales)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  attach "Authorization: Bearer <token>" (if stored)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiTransport::execute ──────────────────────────────┐                 │
//! │       │                                              │ no response     │
//! │       ├── 2xx ──► Ok(response)                       │                 │
//! │       │           + drain offline queue (spawned)    ▼                 │
//! │       │                                   offline && POST/PUT/DELETE?  │
//! │       ├── 401 ──► clear token                 │ yes          │ no      │
//! │       │           emit SessionExpired         ▼              ▼         │
//! │       │           Err(Unauthorized)     enqueue          Err(original) │
//! │       │                                 Err(QueuedOffline{id})         │
//! │       └── other ─► Err(HttpStatus)                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ApiClient::replay`] is the raw path used by the offline queue itself: it
//! attaches credentials but never re-queues and never triggers a drain.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sosy_core::{HttpMethod, MutatingMethod, QueuedRequest};
use sosy_store::CredentialStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEventEmitter, UiEvent};
use crate::network::NetworkMonitor;
use crate::offline::OfflineQueue;
use crate::protocol::{
    PullResponse, PushRequest, PushResponse, SyncStateResponse, PULL_PATH, PUSH_PATH, STATE_PATH,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// Request / Response
// =============================================================================

/// An outgoing API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the API base, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Divert to the offline queue on a network failure while offline.
    pub queue_when_offline: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            queue_when_offline: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Fail instead of deferring when offline.
    pub fn no_offline_queue(mut self) -> Self {
        self.queue_when_offline = false;
        self
    }

    /// Returns the header value for `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path with the query string folded in, as stored in the offline queue.
    pub fn path_with_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let separator = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, separator, encoded)
    }
}

impl From<&QueuedRequest> for ApiRequest {
    fn from(queued: &QueuedRequest) -> Self {
        let mut request = ApiRequest::new(HttpMethod::from(queued.method), queued.url.clone())
            .header(IDEMPOTENCY_HEADER, queued.id.clone())
            .no_offline_queue();
        request.body = queued.data.clone();
        request
    }
}

/// A received HTTP response. Non-2xx statuses are still responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        ApiResponse { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    /// Best-effort error text: `detail`, then `message`, then the raw body.
    pub fn error_message(&self) -> String {
        ["detail", "message"]
            .iter()
            .find_map(|key| self.body.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| match &self.body {
                Value::Null => format!("status {}", self.status),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Sends a request and returns whatever the server answered.
///
/// Implementations return `Ok` for every HTTP status and `Err` only when no
/// response was received (`Network`, `Timeout`).
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse>;
}

/// `reqwest`-backed transport with a fixed timeout.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(ReqwestTransport { client, base_url })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Resolves a relative path against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> SyncResult<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let url = self.resolve(&request.path)?;
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(e) => {
                    debug!(status, error = %e, "Response body is not JSON, keeping it as text");
                    Value::String(text)
                }
            }
        };

        Ok(ApiResponse { status, body })
    }
}

// =============================================================================
// API Client
// =============================================================================

/// Intercepting API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    credentials: CredentialStore,
    network: NetworkMonitor,
    offline: Arc<OfflineQueue>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        credentials: CredentialStore,
        network: NetworkMonitor,
        offline: Arc<OfflineQueue>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        ApiClient {
            transport,
            credentials,
            network,
            offline,
            emitter,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn offline_queue(&self) -> &Arc<OfflineQueue> {
        &self.offline
    }

    /// Sends a request through the interceptor.
    pub async fn request(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let deferrable = if request.queue_when_offline {
            MutatingMethod::try_from(request.method)
                .ok()
                .map(|method| {
                    let url = queueable_url(request.path_with_query());
                    (method, url, request.body.clone())
                })
        } else {
            None
        };

        match self.send(request).await {
            Ok(response) if response.is_success() => {
                if self.network.is_online() {
                    self.spawn_drain();
                }
                Ok(response)
            }
            Ok(response) if response.status == 401 => {
                self.expire_session().await;
                Err(SyncError::Unauthorized)
            }
            Ok(response) => Err(SyncError::HttpStatus {
                status: response.status,
                message: response.error_message(),
            }),
            Err(err) if err.is_network_failure() && !self.network.is_online() => {
                match deferrable {
                    Some((method, url, data)) => {
                        let queued = self.offline.enqueue(method, &url, data).await?;
                        info!(id = %queued.id, method = %method, url = %url, "Offline, request queued");
                        Err(SyncError::QueuedOffline {
                            request_id: queued.id,
                        })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self, path: &str) -> SyncResult<ApiResponse> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> SyncResult<ApiResponse> {
        self.request(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> SyncResult<ApiResponse> {
        self.request(ApiRequest::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> SyncResult<ApiResponse> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Replays a queued request verbatim. Any non-2xx status is an error and
    /// nothing is queued again; a 401 also expires the session.
    pub async fn replay(&self, queued: &QueuedRequest) -> SyncResult<ApiResponse> {
        let response = self.send(ApiRequest::from(queued)).await?;
        if response.is_success() {
            Ok(response)
        } else if response.status == 401 {
            self.expire_session().await;
            Err(SyncError::Unauthorized)
        } else {
            Err(SyncError::HttpStatus {
                status: response.status,
                message: response.error_message(),
            })
        }
    }

    /// Attaches credentials and hands the request to the transport.
    async fn send(&self, mut request: ApiRequest) -> SyncResult<ApiResponse> {
        if let Some(token) = self.credentials.token().await? {
            request
                .headers
                .push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        self.transport.execute(request).await
    }

    fn spawn_drain(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.offline.drain(&client).await {
                warn!(error = %e, "Offline queue drain failed");
            }
        });
    }

    async fn expire_session(&self) {
        warn!("Server rejected credentials, clearing session");
        if let Err(e) = self.credentials.clear().await {
            error!(error = %e, "Failed to clear credentials");
        }
        self.emitter.emit(&UiEvent::SessionExpired);
    }
}

/// Relative paths are stored rooted at '/', the form the transport resolves
/// against the base URL anyway.
fn queueable_url(path: String) -> String {
    if path.starts_with('/') || path.starts_with("http://") || path.starts_with("https://") {
        path
    } else {
        format!("/{}", path)
    }
}

// =============================================================================
// Sync Endpoints
// =============================================================================

/// The three REST sync endpoints.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Changes since `since`, or everything when `None`.
    async fn pull(&self, since: Option<DateTime<Utc>>) -> SyncResult<PullResponse>;

    async fn state(&self) -> SyncResult<SyncStateResponse>;
}

#[async_trait]
impl SyncApi for ApiClient {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let body = serde_json::to_value(request)?;
        self.request(ApiRequest::post(PUSH_PATH, body).no_offline_queue())
            .await?
            .json()
    }

    async fn pull(&self, since: Option<DateTime<Utc>>) -> SyncResult<PullResponse> {
        let mut request = ApiRequest::get(PULL_PATH).no_offline_queue();
        if let Some(since) = since {
            request = request.query("since", since.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        self.request(request).await?.json()
    }

    async fn state(&self) -> SyncResult<SyncStateResponse> {
        self.request(ApiRequest::get(STATE_PATH).no_offline_queue())
            .await?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, FakeTransport, RecordingEmitter};
    use serde_json::json;

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let transport = FakeTransport::ok(json!({"ok": true}));
        let h = harness(transport.clone(), NetworkMonitor::online());
        h.client.credentials().set_token("secret").await.unwrap();

        h.client.get("/products").await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].header_value("authorization"), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_offline_mutation_is_queued() {
        let transport = FakeTransport::unreachable();
        let h = harness(transport, NetworkMonitor::offline());

        let err = h
            .client
            .post("/sales", json!({"total": 1200}))
            .await
            .unwrap_err();

        let SyncError::QueuedOffline { request_id } = err else {
            panic!("expected QueuedOffline, got {:?}", err);
        };
        let queued = h.offline.list_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, request_id);
        assert_eq!(queued[0].method, MutatingMethod::Post);
        assert_eq!(queued[0].url, "/sales");
        assert_eq!(queued[0].data, Some(json!({"total": 1200})));
        assert_eq!(queued[0].retries, 0);
    }

    #[tokio::test]
    async fn test_offline_relative_path_is_queued_rooted() {
        let h = harness(FakeTransport::unreachable(), NetworkMonitor::offline());

        let err = h.client.post("sales", json!({"total": 1})).await.unwrap_err();

        assert!(err.is_offline_queued());
        let queued = h.offline.list_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].url, "/sales");
    }

    #[test]
    fn test_queueable_url() {
        assert_eq!(queueable_url("sales/1?x=2".to_string()), "/sales/1?x=2");
        assert_eq!(queueable_url("/sales".to_string()), "/sales");
        assert_eq!(queueable_url("https://other.host/x".to_string()), "https://other.host/x");
    }

    #[tokio::test]
    async fn test_offline_get_is_not_queued() {
        let h = harness(FakeTransport::unreachable(), NetworkMonitor::offline());

        let err = h.client.get("/products").await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert!(h.offline.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_network_failure_propagates() {
        let h = harness(FakeTransport::unreachable(), NetworkMonitor::online());

        let err = h.client.put("/products/1", json!({})).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert!(h.offline.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_requests_bypass_offline_queue() {
        let h = harness(FakeTransport::unreachable(), NetworkMonitor::offline());

        let push = PushRequest::new("device_1", &[]);
        assert!(h.client.push(&push).await.is_err());
        assert!(h.offline.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credentials() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(401, json!({"detail": "expired"}))));
        let emitter = Arc::new(RecordingEmitter::default());
        let h = harness(transport, NetworkMonitor::online()).with_emitter(emitter.clone());
        h.client.credentials().set_token("stale").await.unwrap();

        let err = h.client.delete("/invoices/4").await.unwrap_err();

        assert!(matches!(err, SyncError::Unauthorized));
        assert_eq!(h.client.credentials().token().await.unwrap(), None);
        assert_eq!(emitter.names(), vec!["session-expired"]);
        assert!(h.offline.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_propagates_unchanged() {
        let transport =
            FakeTransport::new(|_| Ok(ApiResponse::new(422, json!({"detail": "bad quantity"}))));
        let h = harness(transport, NetworkMonitor::offline());

        let err = h.client.post("/sales", json!({})).await.unwrap_err();
        match err {
            SyncError::HttpStatus { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "bad quantity");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(h.offline.list_all().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_triggers_drain() {
        let transport = FakeTransport::ok(json!({}));
        let h = harness(transport.clone(), NetworkMonitor::online());
        let queued = h
            .offline
            .enqueue(MutatingMethod::Post, "/sales", Some(json!({"n": 1})))
            .await
            .unwrap();

        h.client.get("/products").await.unwrap();

        for _ in 0..50 {
            if h.offline.list_all().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(h.offline.list_all().await.unwrap().is_empty());

        let replayed = transport
            .requests()
            .into_iter()
            .find(|r| r.path == "/sales")
            .unwrap();
        assert_eq!(replayed.header_value(IDEMPOTENCY_HEADER), Some(queued.id.as_str()));
    }

    #[test]
    fn test_path_with_query() {
        let request = ApiRequest::get("/sync/pull").query("since", "2024-01-01T00:00:00Z");
        assert_eq!(request.path_with_query(), "/sync/pull?since=2024-01-01T00%3A00%3A00Z");
    }

    #[test]
    fn test_resolve_paths() {
        let transport =
            ReqwestTransport::new(Url::parse("http://localhost:8000/api/").unwrap(), Duration::from_secs(10))
                .unwrap();
        assert_eq!(
            transport.resolve("/sync/push").unwrap().as_str(),
            "http://localhost:8000/api/sync/push"
        );
        assert_eq!(
            transport.resolve("https://other.host/x").unwrap().as_str(),
            "https://other.host/x"
        );
    }

    #[tokio::test]
    async fn test_non_json_body_kept_as_text() {
        let app = axum::Router::new().route("/health", axum::routing::get(|| async { "all good" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = Url::parse(&format!("http://{}", addr)).unwrap();
        let transport = ReqwestTransport::new(base, Duration::from_secs(5)).unwrap();
        let response = transport.execute(ApiRequest::get("/health")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, Value::String("all good".into()));
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(ApiResponse::new(500, Value::Null).error_message(), "status 500");
        assert_eq!(
            ApiResponse::new(400, json!({"message": "nope"})).error_message(),
            "nope"
        );
    }
}
