//! # Offline Request Queue
//!
//! Replays mutating API calls that were deferred while the device was offline.
//!
//! ## Drain Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  snapshot = list_all()                       (FIFO order)              │
//! │                                                                         │
//! │  for entry in snapshot:                                                │
//! │     retries >= 3 ──────────────► finished   emit DeliveryAbandoned    │
//! │     sleep(1000ms * 2^retries)                                          │
//! │     replay(method, url, data) ─┬─ ok  ──► finished                     │
//! │                                └─ err ──► record_failure (retries+1)   │
//! │                                                                         │
//! │  remove_many(finished)          entries enqueued meanwhile survive     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delays are sequential, so a pass over N entries takes at least the sum of
//! their delays. Only one pass runs at a time; a drain requested while one is
//! in flight returns immediately.

use serde_json::Value;
use sosy_core::{BackoffPolicy, MutatingMethod, QueuedRequest};
use sosy_store::{KvStore, OfflineQueueRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::SyncResult;
use crate::events::{AbandonedDelivery, SyncEventEmitter, UiEvent};
use crate::network::NetworkMonitor;

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
    /// Entries removed because they had exhausted their retries.
    pub dropped: usize,
    /// The pass did not run (offline, or another pass in flight).
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        DrainReport {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct OfflineQueue {
    repo: OfflineQueueRepository,
    policy: BackoffPolicy,
    network: NetworkMonitor,
    emitter: Arc<dyn SyncEventEmitter>,
    draining: AtomicBool,
}

impl OfflineQueue {
    pub fn new(
        store: Arc<dyn KvStore>,
        policy: BackoffPolicy,
        network: NetworkMonitor,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        OfflineQueue {
            repo: OfflineQueueRepository::new(store),
            policy,
            network,
            emitter,
            draining: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub async fn enqueue(
        &self,
        method: MutatingMethod,
        url: &str,
        data: Option<Value>,
    ) -> SyncResult<QueuedRequest> {
        Ok(self.repo.enqueue(method, url, data).await?)
    }

    pub async fn dequeue(&self, id: &str) -> SyncResult<bool> {
        Ok(self.repo.dequeue(id).await?)
    }

    pub async fn list_all(&self) -> SyncResult<Vec<QueuedRequest>> {
        Ok(self.repo.list_all().await?)
    }

    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.repo.len().await?)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Replays every queued entry once, in order.
    pub async fn drain(&self, client: &ApiClient) -> SyncResult<DrainReport> {
        if !self.network.is_online() {
            debug!("Offline, drain skipped");
            return Ok(DrainReport::skipped());
        }

        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress");
            return Ok(DrainReport::skipped());
        }
        let _guard = DrainGuard(&self.draining);

        let snapshot = self.repo.list_all().await?;
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }

        info!(count = snapshot.len(), "Draining offline queue");

        let mut report = DrainReport::default();
        let mut finished = Vec::new();

        for entry in &snapshot {
            if self.policy.is_exhausted(entry.retries) {
                warn!(
                    id = %entry.id,
                    method = %entry.method,
                    url = %entry.url,
                    retries = entry.retries,
                    "Dropping request after max retries"
                );
                self.emitter.emit(&UiEvent::DeliveryAbandoned(AbandonedDelivery::Request(
                    entry.clone(),
                )));
                finished.push(entry.id.clone());
                report.dropped += 1;
                continue;
            }

            let delay = self.policy.delay_for(entry.retries);
            debug!(id = %entry.id, ?delay, "Waiting before replay");
            tokio::time::sleep(delay).await;

            match client.replay(entry).await {
                Ok(_) => {
                    debug!(id = %entry.id, url = %entry.url, "Replayed queued request");
                    finished.push(entry.id.clone());
                    report.replayed += 1;
                }
                Err(e) => {
                    let retries = self.repo.record_failure(&entry.id).await?;
                    warn!(id = %entry.id, url = %entry.url, ?retries, error = %e, "Replay failed");
                    report.failed += 1;
                }
            }
        }

        self.repo.remove_many(&finished).await?;

        info!(
            replayed = report.replayed,
            failed = report.failed,
            dropped = report.dropped,
            "Offline queue drain complete"
        );
        Ok(report)
    }

    /// Spawns a task that drains the queue on every Offline → Online transition.
    pub fn spawn_on_reconnect(self: Arc<Self>, client: ApiClient, network: NetworkMonitor) -> JoinHandle<()> {
        let mut transitions = network.online_transitions();
        tokio::spawn(async move {
            while transitions.next().await.is_some() {
                info!("Back online, draining offline queue");
                if let Err(e) = self.drain(&client).await {
                    warn!(error = %e, "Offline queue drain failed");
                }
            }
        })
    }
}

/// Clears the draining flag when a pass ends, including on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
