//! # Sync Agent
//!
//! Owns every sync component for one installation and wires them together.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │   KvStore (SQLite or memory)                                            │
//! │     │  device_id · auth_token · sosy_offline_queue · sosy_sync_queue   │
//! │     ▼                                                                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  NetworkMonitor ──► OfflineQueue ◄── ApiClient (interceptor)     │  │
//! │  │        │                 ▲               │                       │  │
//! │  │        │   Offline→Online│drain          │ SyncApi               │  │
//! │  │        ▼                 │               ▼                       │  │
//! │  │   reachability      reconnect       SyncWorker (push/pull)       │  │
//! │  │   probe task        drain task      RealtimeClient (WS)          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  UI EVENTS (SyncEventEmitter):                                          │
//! │  ─────────────────────────────                                          │
//! │  "sync-changes" · "sync-sale-created" · "sync-stock-updated"           │
//! │  "sync-product-updated" · "session-expired" · "sync-delivery-abandoned"│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sosy_store::{CredentialStore, DeviceIdentity, DraftRepository, KvStore, SyncQueueRepository};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiTransport, ReqwestTransport, SyncApi};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};
use crate::network::{NetworkMonitor, NetworkState};
use crate::offline::OfflineQueue;
use crate::realtime::{RealtimeClient, RealtimeConfig};
use crate::stock_take::StockTakeSync;
use crate::worker::{SyncWorker, WorkerOptions};

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`SyncAgent`] from configuration and a key-value store.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    store: Arc<dyn KvStore>,
    emitter: Arc<dyn SyncEventEmitter>,
    transport: Option<Arc<dyn ApiTransport>>,
}

impl SyncAgentBuilder {
    pub fn new(config: SyncConfig, store: Arc<dyn KvStore>) -> Self {
        SyncAgentBuilder {
            config,
            store,
            emitter: Arc::new(NoOpEmitter),
            transport: None,
        }
    }

    /// Receiver of UI events. Defaults to [`NoOpEmitter`].
    pub fn emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// HTTP transport. Defaults to [`ReqwestTransport`] against `api.base_url`.
    pub fn transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub async fn build(self) -> SyncResult<SyncAgent> {
        let SyncAgentBuilder {
            config,
            store,
            emitter,
            transport,
        } = self;

        config.validate()?;

        let identity = DeviceIdentity::new(store.clone());
        let device_id = match config.device.id {
            Some(ref id) => {
                identity.set(id).await?;
                id.clone()
            }
            None => identity.get_or_create().await?,
        };

        let credentials = CredentialStore::new(store.clone());
        if let Some(ref token) = config.session.auth_token {
            credentials.set_token(token).await?;
        }

        let network = NetworkMonitor::new(if config.network.assume_online {
            NetworkState::Online
        } else {
            NetworkState::Offline
        });

        let transport = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                config.api_base_url()?,
                config.request_timeout(),
            )?),
        };

        let offline = Arc::new(OfflineQueue::new(
            store.clone(),
            config.offline_policy(),
            network.clone(),
            emitter.clone(),
        ));

        let api = ApiClient::new(
            transport,
            credentials.clone(),
            network.clone(),
            offline.clone(),
            emitter.clone(),
        );

        let queue = SyncQueueRepository::new(store.clone())
            .with_max_retries(config.sync.max_retries)
            .with_capacity(config.sync.capacity);

        let worker = SyncWorker::new(
            queue.clone(),
            Arc::new(api.clone()) as Arc<dyn SyncApi>,
            network.clone(),
            emitter.clone(),
            device_id.clone(),
            WorkerOptions {
                compaction_probability: config.sync.compaction_probability,
            },
        );

        let realtime = RealtimeClient::new(RealtimeConfig::from_sync_config(&config)?, device_id.clone());
        realtime.forward_to_ui(emitter);

        let drafts = DraftRepository::new(store.clone());
        let stock_take = StockTakeSync::new(store, queue);

        info!(device_id = %device_id, api = %config.api.base_url, "Sync agent built");

        Ok(SyncAgent {
            config: Arc::new(config),
            device_id,
            network,
            credentials,
            offline,
            api,
            worker,
            realtime,
            stock_take,
            drafts,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Main sync agent that orchestrates all sync operations.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    device_id: String,
    network: NetworkMonitor,
    credentials: CredentialStore,
    offline: Arc<OfflineQueue>,
    api: ApiClient,
    worker: SyncWorker,
    realtime: RealtimeClient,
    stock_take: StockTakeSync,
    drafts: DraftRepository,

    /// Reconnect drain and reachability probe, while started.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncAgent {
    pub fn builder(config: SyncConfig, store: Arc<dyn KvStore>) -> SyncAgentBuilder {
        SyncAgentBuilder::new(config, store)
    }

    /// Starts the periodic worker, the reconnect drain and (if enabled) the
    /// reachability probe. Calling it again while started does nothing.
    pub fn start(&self) -> SyncResult<()> {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            debug!("Sync agent already started");
            return Ok(());
        }

        tasks.push(
            self.offline
                .clone()
                .spawn_on_reconnect(self.api.clone(), self.network.clone()),
        );

        if self.config.network.probe_enabled {
            let client = reqwest::Client::builder()
                .timeout(self.config.request_timeout())
                .build()
                .map_err(SyncError::from)?;
            let url = self
                .config
                .api_base_url()?
                .join(&self.config.network.probe_path)?;
            let interval = std::time::Duration::from_secs(self.config.network.probe_interval_secs);
            tasks.push(self.network.spawn_probe(client, url, interval));
        }

        self.worker.start(self.config.sync_interval());

        info!(
            device_id = %self.device_id,
            interval_ms = self.config.sync.interval_ms,
            "Sync agent started"
        );
        Ok(())
    }

    /// Opens the realtime session for a signed-in user.
    ///
    /// Does nothing when realtime is disabled.
    pub async fn connect_session(&self, business_id: i64, user_id: i64) -> SyncResult<()> {
        sosy_core::validation::validate_identity(business_id, user_id)?;
        if !self.config.realtime.enabled {
            debug!("Realtime disabled, session not connected");
            return Ok(());
        }
        self.realtime.connect(business_id, user_id).await
    }

    /// Closes the realtime session and forgets the bearer token.
    pub async fn end_session(&self) -> SyncResult<()> {
        self.realtime.disconnect().await;
        self.credentials.clear().await?;
        info!("Session ended");
        Ok(())
    }

    /// Stops every background task. Queued data stays in storage.
    pub async fn shutdown(&self) {
        info!("Shutting down sync agent");

        self.worker.stop().await;

        let tasks: Vec<JoinHandle<()>> = self.tasks().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        self.realtime.disconnect().await;
        info!("Sync agent stopped");
    }

    pub fn is_started(&self) -> bool {
        !self.tasks().is_empty()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn worker(&self) -> &SyncWorker {
        &self.worker
    }

    pub fn offline_queue(&self) -> &Arc<OfflineQueue> {
        &self.offline
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    pub fn stock_take(&self) -> &StockTakeSync {
        &self.stock_take
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Form drafts kept in the same store.
    pub fn drafts(&self) -> &DraftRepository {
        &self.drafts
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use crate::protocol::{PULL_PATH, PUSH_PATH};
    use crate::realtime::ConnectionState;
    use crate::test_support::{FakeTransport, RecordingEmitter};
    use serde_json::{json, Value};
    use sosy_core::SyncActionType;
    use sosy_store::MemoryKvStore;

    fn test_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.network.probe_enabled = false;
        config.realtime.enabled = false;
        config
    }

    /// Acknowledges every pushed action and returns one pulled change.
    fn server() -> Arc<FakeTransport> {
        FakeTransport::new(|request| {
            if request.path == PUSH_PATH {
                let ids: Vec<Value> = request
                    .body
                    .as_ref()
                    .and_then(|b| b["actions"].as_array())
                    .map(|actions| actions.iter().map(|a| a["id"].clone()).collect())
                    .unwrap_or_default();
                Ok(ApiResponse::new(200, json!({"success": true, "processed_ids": ids})))
            } else if request.path == PULL_PATH {
                Ok(ApiResponse::new(
                    200,
                    json!({
                        "changes": [{
                            "type": "product",
                            "entity_id": 7,
                            "data": {"name": "Rice 5kg"},
                            "updated_at": "2026-01-05T10:00:00Z",
                            "action": "update"
                        }],
                        "has_more": false
                    }),
                ))
            } else {
                Ok(ApiResponse::new(200, json!({})))
            }
        })
    }

    async fn agent(
        config: SyncConfig,
        store: Arc<dyn KvStore>,
        emitter: Arc<RecordingEmitter>,
    ) -> SyncAgent {
        SyncAgent::builder(config, store)
            .transport(server())
            .emitter(emitter)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_generated_device_id_is_stable() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let emitter = Arc::new(RecordingEmitter::default());

        let first = agent(test_config(), store.clone(), emitter.clone()).await;
        let second = agent(test_config(), store, emitter).await;

        assert!(first.device_id().starts_with("device_"));
        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(first.worker().device_id(), first.device_id());
    }

    #[tokio::test]
    async fn test_configured_device_id_is_pinned() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut config = test_config();
        config.device.id = Some("till-01".into());

        let agent = agent(config, store.clone(), Arc::new(RecordingEmitter::default())).await;

        assert_eq!(agent.device_id(), "till-01");
        assert_eq!(
            DeviceIdentity::new(store).get().await.unwrap().as_deref(),
            Some("till-01")
        );
    }

    #[tokio::test]
    async fn test_session_token_seeds_credentials() {
        let mut config = test_config();
        config.session.auth_token = Some("tok-123".into());

        let agent = agent(
            config,
            Arc::new(MemoryKvStore::new()),
            Arc::new(RecordingEmitter::default()),
        )
        .await;

        assert_eq!(
            agent.credentials().token().await.unwrap().as_deref(),
            Some("tok-123")
        );

        agent.end_session().await.unwrap();
        assert!(agent.credentials().token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drafts_survive_agent_restart() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let emitter = Arc::new(RecordingEmitter::default());

        let first = agent(test_config(), store.clone(), emitter.clone()).await;
        first.drafts().save("new_sale", &json!({"qty": 3})).await.unwrap();

        let second = agent(test_config(), store, emitter).await;
        assert_eq!(
            second.drafts().get::<Value>("new_sale").await.unwrap(),
            Some(json!({"qty": 3}))
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.sync.interval_ms = 0;

        let result = SyncAgent::builder(config, Arc::new(MemoryKvStore::new()))
            .transport(server())
            .build()
            .await;

        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_sale_round_trip_through_worker() {
        let emitter = Arc::new(RecordingEmitter::default());
        let agent = agent(test_config(), Arc::new(MemoryKvStore::new()), emitter.clone()).await;

        agent
            .worker()
            .queue()
            .add(SyncActionType::Sale, json!({"total": 1500}))
            .await
            .unwrap();

        let outcome = agent.worker().sync().await;
        assert!(outcome.is_completed());

        let queue = agent.worker().queue().get_all().await.unwrap();
        assert!(queue.iter().all(|a| a.synced));
        assert!(agent.worker().last_sync_at().is_some());
        assert!(emitter.names().contains(&"sync-changes"));
    }

    #[tokio::test]
    async fn test_connect_session_skipped_when_realtime_disabled() {
        let agent = agent(
            test_config(),
            Arc::new(MemoryKvStore::new()),
            Arc::new(RecordingEmitter::default()),
        )
        .await;

        agent.connect_session(1, 2).await.unwrap();
        assert_eq!(agent.realtime().state(), ConnectionState::Disconnected);

        assert!(agent.connect_session(0, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let agent = agent(
            test_config(),
            Arc::new(MemoryKvStore::new()),
            Arc::new(RecordingEmitter::default()),
        )
        .await;

        agent.start().unwrap();
        agent.start().unwrap();
        assert!(agent.is_started());
        assert!(agent.worker().is_running());

        agent.shutdown().await;
        assert!(!agent.is_started());
        assert!(!agent.worker().is_running());
    }
}
