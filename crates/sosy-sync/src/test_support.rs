//! Fakes shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sosy_core::BackoffPolicy;
use sosy_store::{CredentialStore, KvStore, MemoryKvStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::api::{ApiClient, ApiRequest, ApiResponse, ApiTransport, SyncApi};
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter, UiEvent};
use crate::network::NetworkMonitor;
use crate::offline::OfflineQueue;
use crate::protocol::{PullResponse, PushRequest, PushResponse, SyncStateResponse};

type Handler = Box<dyn Fn(&ApiRequest) -> SyncResult<ApiResponse> + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub(crate) struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> SyncResult<ApiResponse> + Send + Sync + 'static,
    {
        Arc::new(FakeTransport {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(body: Value) -> Arc<Self> {
        Self::new(move |_| Ok(ApiResponse::new(200, body.clone())))
    }

    pub fn unreachable() -> Arc<Self> {
        Self::new(|_| Err(SyncError::Network("connection refused".into())))
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ApiTransport for FakeTransport {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

/// Emitter that keeps every event.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(UiEvent::name).collect()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit(&self, event: &UiEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// An API client wired to in-memory storage.
pub(crate) struct Harness {
    pub store: Arc<dyn KvStore>,
    pub network: NetworkMonitor,
    pub offline: Arc<OfflineQueue>,
    pub client: ApiClient,
    transport: Arc<FakeTransport>,
}

pub(crate) fn harness(transport: Arc<FakeTransport>, network: NetworkMonitor) -> Harness {
    build(
        Arc::new(MemoryKvStore::new()),
        transport,
        network,
        Arc::new(NoOpEmitter),
    )
}

impl Harness {
    pub fn with_emitter(self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        build(self.store, self.transport, self.network, emitter)
    }
}

fn build(
    store: Arc<dyn KvStore>,
    transport: Arc<FakeTransport>,
    network: NetworkMonitor,
    emitter: Arc<dyn SyncEventEmitter>,
) -> Harness {
    let offline = Arc::new(OfflineQueue::new(
        store.clone(),
        BackoffPolicy::offline_queue(),
        network.clone(),
        emitter.clone(),
    ));
    let client = ApiClient::new(
        transport.clone(),
        CredentialStore::new(store.clone()),
        network.clone(),
        offline.clone(),
        emitter,
    );
    Harness {
        store,
        network,
        offline,
        client,
        transport,
    }
}

/// Scripted sync endpoints.
#[derive(Default)]
pub(crate) struct FakeSyncApi {
    push_results: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pull_results: Mutex<VecDeque<SyncResult<PullResponse>>>,
    pub pushes: Mutex<Vec<PushRequest>>,
    pub pulls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl FakeSyncApi {
    pub fn script_push(&self, result: SyncResult<PushResponse>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    pub fn script_pull(&self, result: SyncResult<PullResponse>) {
        self.pull_results.lock().unwrap().push_back(result);
    }

    /// Acknowledges every action of the next push.
    pub fn accept_all() -> PushResponse {
        PushResponse {
            success: true,
            ..Default::default()
        }
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.lock().unwrap().len()
    }
}

#[async_trait]
impl SyncApi for FakeSyncApi {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushes.lock().unwrap().push(request.clone());
        let scripted = self.push_results.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(mut response)) => {
                if response.success && response.processed_ids.is_empty() && response.failed_ids.is_empty() {
                    response.processed_ids = request.actions.iter().map(|a| a.id.clone()).collect();
                }
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => Ok(PushResponse {
                success: true,
                processed_ids: request.actions.iter().map(|a| a.id.clone()).collect(),
                ..Default::default()
            }),
        }
    }

    async fn pull(&self, since: Option<DateTime<Utc>>) -> SyncResult<PullResponse> {
        self.pulls.lock().unwrap().push(since);
        let scripted = self.pull_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(PullResponse::default()))
    }

    async fn state(&self) -> SyncResult<SyncStateResponse> {
        Ok(SyncStateResponse::default())
    }
}
