//! # Realtime Client
//!
//! WebSocket client for server push notifications, with heartbeat and
//! bounded automatic reconnection.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Realtime Connection States                           │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │Disconnected│ ──────────────► │ Connecting │ ◄───────────────┐       │
//! │  └────────────┘                 └─────┬──────┘                 │       │
//! │        ▲                              │                        │       │
//! │        │                    success   │   failure              │       │
//! │        │                        ┌─────┴─────┐                  │       │
//! │        │                        ▼           │                  │       │
//! │        │              ┌────────────┐        │                  │       │
//! │        │              │ Connected  │        │                  │       │
//! │        │              └─────┬──────┘        │                  │ timer │
//! │   disconnect()              │ close/error   │                  │       │
//! │        │                    ▼               ▼                  │       │
//! │        │              attempts < 5 ? ──yes──► ┌────────────┐   │       │
//! │        │                    │                 │Reconnecting│ ──┘       │
//! │        │                    no                └────────────┘           │
//! │        │                    ▼                                          │
//! │        │              ┌────────────┐                                   │
//! │        └───────────── │  GaveUp    │  (until the next connect())       │
//! │                       └────────────┘                                   │
//! │                                                                         │
//! │  BACKOFF: 1s, 2s, 4s, 8s, 16s, then give up                            │
//! │  HEARTBEAT: {"type":"ping"} every 30s while connected                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Incoming messages are delivered to listeners registered with
//! [`RealtimeClient::on`] under their `type`. The client itself emits
//! `connected`, `disconnected` and `error`.

use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sosy_core::validation::validate_identity;
use sosy_core::BackoffPolicy;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEventEmitter, UiEvent};
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::protocol::{
    ClientMessage, ServerMessage, EVENT_CONNECTED, EVENT_DISCONNECTED, EVENT_ERROR,
    PRODUCT_UPDATED, SALE_CREATED, STOCK_UPDATED,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connection State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Waiting before the next reconnection attempt.
    Reconnecting,
    /// Reconnection attempts exhausted.
    GaveUp,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::GaveUp => write!(f, "gave_up"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// ws(s) base; sessions connect to `<base>/ws/<business_id>`.
    pub base_url: Url,
    pub policy: BackoffPolicy,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl RealtimeConfig {
    pub fn new(base_url: Url) -> Self {
        RealtimeConfig {
            base_url,
            policy: BackoffPolicy::realtime(),
            heartbeat_interval: Duration::from_secs(sosy_core::HEARTBEAT_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_sync_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(RealtimeConfig {
            base_url: config.realtime_base_url()?,
            policy: config.realtime_policy(),
            heartbeat_interval: Duration::from_secs(config.realtime.heartbeat_interval_secs),
            connect_timeout: Duration::from_secs(config.realtime.connect_timeout_secs),
        })
    }

    /// `<base>/ws/<business_id>?user_id=<user_id>&device_id=<device_id>`
    pub fn endpoint(&self, business_id: i64, user_id: i64, device_id: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/ws/{}", url.path().trim_end_matches('/'), business_id);
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("user_id", &user_id.to_string())
            .append_pair("device_id", device_id);
        url
    }
}

// =============================================================================
// Reconnect Backoff
// =============================================================================

/// [`BackoffPolicy`] driven through the `backoff` crate's trait.
///
/// Yields `base * 2^n` for n = 0.. and `None` once the cap is reached.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        ReconnectBackoff { policy, attempt: 0 }
    }

    /// Reconnect attempts handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Backoff for ReconnectBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.policy.is_exhausted(self.attempt) {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

// =============================================================================
// Realtime Client
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionKey {
    business_id: i64,
    user_id: i64,
}

struct Session {
    key: SessionKey,
    outgoing_tx: mpsc::Sender<ClientMessage>,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Session {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Realtime session task ended abnormally");
        }
    }
}

struct Inner {
    config: RealtimeConfig,
    device_id: String,
    listeners: Mutex<HashMap<String, Arc<ListenerRegistry<Value>>>>,
    session: tokio::sync::Mutex<Option<Session>>,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes the state only if `generation` is still the live session.
    fn set_state(&self, generation: u64, state: ConnectionState) {
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) == generation {
            *current = state;
        }
    }

    fn force_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Arc<ListenerRegistry<Value>>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &str, payload: &Value) {
        let registry = self.listeners().get(event).cloned();
        match registry {
            Some(registry) => {
                let delivered = registry.notify(payload);
                trace!(event, delivered, "Realtime event delivered");
            }
            None => trace!(event, "No listeners for realtime event"),
        }
    }

    /// Routes one text frame to listeners.
    fn route_text(&self, text: &str) {
        match ServerMessage::from_json(text) {
            Ok(ServerMessage::Pong) => trace!("Heartbeat acknowledged"),
            Ok(ServerMessage::Connected) => debug!("Server acknowledged realtime session"),
            Ok(message) => {
                debug!(event = message.event_name(), "Realtime event received");
                let payload = message.payload().cloned().unwrap_or(Value::Null);
                self.emit(message.event_name(), &payload);
            }
            Err(e) => warn!(error = %e, "Dropping malformed realtime message"),
        }
    }
}

/// Realtime client handle. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, device_id: impl Into<String>) -> Self {
        RealtimeClient {
            inner: Arc::new(Inner {
                config,
                device_id: device_id.into(),
                listeners: Mutex::new(HashMap::new()),
                session: tokio::sync::Mutex::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
                reconnect_attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Opens a session for `(business_id, user_id)`.
    ///
    /// No-op if a live session for the same pair exists. A session for a
    /// different pair is closed first.
    pub async fn connect(&self, business_id: i64, user_id: i64) -> SyncResult<()> {
        validate_identity(business_id, user_id)?;
        let key = SessionKey {
            business_id,
            user_id,
        };

        let mut session = self.inner.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.key == key
                && !current.handle.is_finished()
                && self.state() != ConnectionState::GaveUp
            {
                debug!(business_id, user_id, "Realtime session already active");
                return Ok(());
            }
        }

        if let Some(previous) = session.take() {
            info!(
                from_business = previous.key.business_id,
                to_business = business_id,
                "Replacing realtime session"
            );
            previous.shutdown().await;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.reconnect_attempts.store(0, Ordering::Release);
        self.inner.set_state(generation, ConnectionState::Connecting);

        let url = self
            .inner
            .config
            .endpoint(business_id, user_id, &self.inner.device_id);
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<ClientMessage>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let task = SessionTask {
            inner: self.inner.clone(),
            url,
            generation,
            outgoing_rx,
            shutdown_rx,
        };
        let handle = tokio::spawn(task.run());

        *session = Some(Session {
            key,
            outgoing_tx,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Closes the session. Never triggers reconnection.
    pub async fn disconnect(&self) {
        let session = self.inner.session.lock().await.take();
        if let Some(session) = session {
            info!(business_id = session.key.business_id, "Disconnecting realtime session");
            session.shutdown().await;
        }

        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.force_state(ConnectionState::Disconnected);
        self.inner.reconnect_attempts.store(0, Ordering::Release);
    }

    /// Sends a message on the open socket.
    ///
    /// Returns false (and logs a warning) when not connected; nothing is queued.
    pub async fn send(&self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            warn!(msg_type = message.type_name(), "Realtime not connected, message not sent");
            return false;
        }

        let outgoing = self
            .inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.outgoing_tx.clone());

        match outgoing {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Sends `{"type":"sync_event","event_type":..,"payload":..}`.
    pub async fn emit_sync_event(&self, event_type: impl Into<String>, payload: Value) -> bool {
        self.send(ClientMessage::SyncEvent {
            event_type: event_type.into(),
            payload,
        })
        .await
    }

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .listeners()
            .entry(event.to_string())
            .or_insert_with(|| Arc::new(ListenerRegistry::new()))
            .add(listener)
    }

    /// Removes a listener. Returns false if it was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners();
        let Some(registry) = listeners.get(event) else {
            return false;
        };
        let removed = registry.remove(id);
        if registry.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Re-dispatches domain events to the UI as `sync-*` events.
    ///
    /// Returns the registrations so they can be removed with [`RealtimeClient::off`].
    pub fn forward_to_ui(&self, emitter: Arc<dyn SyncEventEmitter>) -> Vec<(&'static str, ListenerId)> {
        let routes: [(&'static str, fn(Value) -> UiEvent); 3] = [
            (SALE_CREATED, UiEvent::SaleCreated),
            (STOCK_UPDATED, UiEvent::StockUpdated),
            (PRODUCT_UPDATED, UiEvent::ProductUpdated),
        ];

        routes
            .into_iter()
            .map(|(event, to_ui)| {
                let emitter = emitter.clone();
                let id = self.on(event, move |payload| emitter.emit(&to_ui(payload.clone())));
                (event, id)
            })
            .collect()
    }
}

// =============================================================================
// Session Task
// =============================================================================

async fn connect_with_timeout(url: &Url, limit: Duration) -> SyncResult<WsStream> {
    match timeout(limit, connect_async(url.as_str())).await {
        Ok(Ok((ws_stream, response))) => {
            debug!(status = ?response.status(), "WebSocket handshake complete");
            Ok(ws_stream)
        }
        Ok(Err(e)) => Err(SyncError::from(e)),
        Err(_) => Err(SyncError::Timeout(limit.as_secs())),
    }
}

enum LoopEnd {
    Shutdown,
    Closed,
    Failed(SyncError),
}

struct SessionTask {
    inner: Arc<Inner>,
    url: Url,
    generation: u64,
    outgoing_rx: mpsc::Receiver<ClientMessage>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SessionTask {
    async fn run(mut self) {
        info!(url = %self.url, "Realtime session starting");
        let mut backoff = ReconnectBackoff::new(self.inner.config.policy);

        loop {
            self.inner.set_state(self.generation, ConnectionState::Connecting);

            let limit = self.inner.config.connect_timeout;
            let connected = tokio::select! {
                result = connect_with_timeout(&self.url, limit) => result,
                _ = self.shutdown_rx.recv() => {
                    debug!("Shutdown while connecting");
                    return;
                }
            };

            match connected {
                Ok(ws_stream) => {
                    backoff.reset();
                    self.inner.reconnect_attempts.store(0, Ordering::Release);
                    self.inner.set_state(self.generation, ConnectionState::Connected);
                    info!("Realtime connected");
                    self.inner.emit(EVENT_CONNECTED, &Value::Null);

                    let end = self.connection_loop(ws_stream).await;

                    self.inner.set_state(self.generation, ConnectionState::Disconnected);
                    match end {
                        LoopEnd::Shutdown => {
                            self.inner.emit(EVENT_DISCONNECTED, &Value::Null);
                            info!("Realtime session closed");
                            return;
                        }
                        LoopEnd::Closed => {
                            info!("Realtime connection closed by server");
                        }
                        LoopEnd::Failed(e) => {
                            warn!(error = %e, "Realtime connection lost");
                            self.inner.emit(EVENT_ERROR, &json!({ "message": e.to_string() }));
                        }
                    }
                    self.inner.emit(EVENT_DISCONNECTED, &Value::Null);
                }
                Err(e) => {
                    warn!(error = %e, "Realtime connection attempt failed");
                    self.inner.set_state(self.generation, ConnectionState::Disconnected);
                    self.inner.emit(EVENT_ERROR, &json!({ "message": e.to_string() }));
                    self.inner.emit(EVENT_DISCONNECTED, &Value::Null);
                }
            }

            while let Ok(message) = self.outgoing_rx.try_recv() {
                debug!(msg_type = message.type_name(), "Dropping unsent realtime message");
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    let attempt = backoff.attempt();
                    self.inner.reconnect_attempts.store(attempt, Ordering::Release);
                    self.inner.set_state(self.generation, ConnectionState::Reconnecting);
                    info!(attempt, ?delay, "Scheduling realtime reconnect");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_rx.recv() => {
                            debug!("Shutdown during reconnect backoff");
                            return;
                        }
                    }
                }
                None => {
                    error!(
                        attempts = backoff.attempt(),
                        "Max realtime reconnection attempts reached, giving up"
                    );
                    self.inner.set_state(self.generation, ConnectionState::GaveUp);
                    return;
                }
            }
        }
    }

    async fn connection_loop(&mut self, ws_stream: WsStream) -> LoopEnd {
        let (mut write, mut read) = ws_stream.split();

        let heartbeat = self.inner.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(message) = self.outgoing_rx.recv() => {
                    let json = match message.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode realtime message");
                            continue;
                        }
                    };
                    debug!(msg_type = message.type_name(), "Sending realtime message");
                    if let Err(e) = write.send(WsMessage::Text(json.into())).await {
                        return LoopEnd::Failed(SyncError::from(e));
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => self.inner.route_text(text.as_str()),
                        Some(Ok(WsMessage::Ping(_))) => trace!("Received ping"),
                        Some(Ok(WsMessage::Pong(_))) => trace!("Received pong frame"),
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Received close frame");
                            return LoopEnd::Closed;
                        }
                        Some(Ok(WsMessage::Binary(_))) => warn!("Ignoring binary realtime frame"),
                        Some(Ok(WsMessage::Frame(_))) => {}
                        Some(Err(e)) => return LoopEnd::Failed(SyncError::from(e)),
                        None => return LoopEnd::Closed,
                    }
                }

                _ = ticker.tick() => {
                    let ping = match ClientMessage::Ping.to_json() {
                        Ok(ping) => ping,
                        Err(e) => return LoopEnd::Failed(e),
                    };
                    if let Err(e) = write.send(WsMessage::Text(ping.into())).await {
                        return LoopEnd::Failed(SyncError::from(e));
                    }
                    trace!("Sent heartbeat");
                }

                _ = self.shutdown_rx.recv() => {
                    debug!("Closing realtime connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return LoopEnd::Shutdown;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn client() -> RealtimeClient {
        let config = RealtimeConfig::new(Url::parse("ws://127.0.0.1:9").unwrap());
        RealtimeClient::new(config, "device_test")
    }

    #[test]
    fn test_reconnect_backoff_schedule() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy::realtime());
        let delays: Vec<Duration> = std::iter::from_fn(|| backoff.next_backoff()).collect();

        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000]
                .into_iter()
                .map(Duration::from_millis)
                .collect::<Vec<_>>()
        );
        assert_eq!(backoff.attempt(), 5);
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_endpoint_url() {
        let config = RealtimeConfig::new(Url::parse("wss://api.sosy.app/").unwrap());
        let url = config.endpoint(12, 7, "device_1");
        assert_eq!(url.as_str(), "wss://api.sosy.app/ws/12?user_id=7&device_id=device_1");

        let config = RealtimeConfig::new(Url::parse("ws://localhost:8000/api").unwrap());
        assert_eq!(
            config.endpoint(1, 2, "d").as_str(),
            "ws://localhost:8000/api/ws/1?user_id=2&device_id=d"
        );
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::GaveUp.to_string(), "gave_up");
    }

    #[tokio::test]
    async fn test_send_when_disconnected_is_refused() {
        let client = client();
        assert!(!client.send(ClientMessage::Ping).await);
        assert!(!client.emit_sync_event("SALE_CREATED", json!({})).await);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_identity() {
        let client = client();
        assert!(client.connect(0, 5).await.is_err());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_routing_delivers_domain_and_unknown_types() {
        let client = client();
        let stock = Arc::new(Mutex::new(Vec::new()));
        let unknown = Arc::new(AtomicUsize::new(0));

        let sink = stock.clone();
        client.on(STOCK_UPDATED, move |payload| sink.lock().unwrap().push(payload.clone()));
        let counter = unknown.clone();
        client.on("SHIFT_CLOSED", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let pongs = Arc::new(AtomicUsize::new(0));
        let pong_counter = pongs.clone();
        client.on("pong", move |_| {
            pong_counter.fetch_add(1, Ordering::SeqCst);
        });

        client
            .inner
            .route_text(r#"{"type":"STOCK_UPDATED","payload":{"product_id":7,"quantity":3}}"#);
        client.inner.route_text(r#"{"type":"SHIFT_CLOSED"}"#);
        client.inner.route_text(r#"{"type":"pong"}"#);
        client.inner.route_text("garbage");

        assert_eq!(*stock.lock().unwrap(), vec![json!({"product_id": 7, "quantity": 3})]);
        assert_eq!(unknown.load(Ordering::SeqCst), 1);
        assert_eq!(pongs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_on_off() {
        let client = client();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = client.on(SALE_CREATED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.inner.route_text(r#"{"type":"SALE_CREATED","payload":{}}"#);
        assert!(client.off(SALE_CREATED, id));
        assert!(!client.off(SALE_CREATED, id));
        client.inner.route_text(r#"{"type":"SALE_CREATED","payload":{}}"#);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let client = client();
        let hits = Arc::new(AtomicUsize::new(0));
        client.on(PRODUCT_UPDATED, |_| panic!("listener bug"));
        let counter = hits.clone();
        client.on(PRODUCT_UPDATED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.inner.route_text(r#"{"type":"PRODUCT_UPDATED","payload":{"id":1}}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forward_to_ui() {
        use crate::test_support::RecordingEmitter;

        let client = client();
        let emitter = Arc::new(RecordingEmitter::default());
        let routes = client.forward_to_ui(emitter.clone());
        assert_eq!(routes.len(), 3);

        client.inner.route_text(r#"{"type":"SALE_CREATED","payload":{"id":3}}"#);
        client.inner.route_text(r#"{"type":"INVOICE_CREATED","payload":{"id":4}}"#);

        assert_eq!(emitter.events(), vec![UiEvent::SaleCreated(json!({"id": 3}))]);
    }
}
