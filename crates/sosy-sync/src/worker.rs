//! # Sync Worker
//!
//! Periodically pushes queued domain actions and pulls server changes.
//!
//! ## Sync Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Cycle                                     │
//! │                                                                         │
//! │  triggers: start() · every interval · Offline → Online · sync()        │
//! │                                                                         │
//! │  offline? ──► Skipped(Offline)                                         │
//! │  is_syncing? ──► Skipped(AlreadySyncing)                               │
//! │       │                                                                 │
//! │       ▼  is_syncing = true, notify listeners                           │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ PUSH  get_unsynced() ──► POST /sync/push {device_id, actions}    │  │
//! │  │        ok:  processed → synced, failed → retry+1                 │  │
//! │  │             ~10%: clear_synced()                                 │  │
//! │  │        err: every batch entry retry+1, cycle FAILS               │  │
//! │  ├──────────────────────────────────────────────────────────────────┤  │
//! │  │ PULL  GET /sync/pull?since=last_sync_at                          │  │
//! │  │        changes → UiEvent::ChangesPulled                          │  │
//! │  │        err: logged, cycle continues                              │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │       │                                                                 │
//! │       ▼  success: last_sync_at = now, error = None                     │
//! │          failure: error = Some(reason)                                 │
//! │          is_syncing = false, notify listeners                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sosy_core::SyncStatus;
use sosy_store::SyncQueueRepository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::SyncApi;
use crate::error::SyncResult;
use crate::events::{AbandonedDelivery, SyncEventEmitter, UiEvent};
use crate::listeners::{ListenerRegistry, Subscription};
use crate::network::NetworkMonitor;
use crate::protocol::PushRequest;

// =============================================================================
// Outcome Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
}

/// What a call to [`SyncWorker::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed {
        /// Actions the server acknowledged.
        pushed: usize,
        /// Actions the server listed as failed.
        rejected: usize,
        /// Changes received from pull.
        pulled: usize,
    },
    Failed {
        reason: String,
    },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }
}

/// Tunables that do not come from the queue itself.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Chance that a successful push is followed by `clear_synced()`.
    pub compaction_probability: f64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        WorkerOptions {
            compaction_probability: 0.1,
        }
    }
}

// =============================================================================
// Sync Worker
// =============================================================================

#[derive(Default)]
struct CycleState {
    last_sync_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

struct RunningLoop {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

struct Inner {
    queue: SyncQueueRepository,
    api: Arc<dyn SyncApi>,
    network: NetworkMonitor,
    emitter: Arc<dyn SyncEventEmitter>,
    device_id: String,
    options: WorkerOptions,
    is_syncing: AtomicBool,
    state: Mutex<CycleState>,
    listeners: Arc<ListenerRegistry<SyncStatus>>,
    running: Mutex<Option<RunningLoop>>,
}

/// Push/pull worker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncWorker {
    inner: Arc<Inner>,
}

impl SyncWorker {
    pub fn new(
        queue: SyncQueueRepository,
        api: Arc<dyn SyncApi>,
        network: NetworkMonitor,
        emitter: Arc<dyn SyncEventEmitter>,
        device_id: impl Into<String>,
        options: WorkerOptions,
    ) -> Self {
        SyncWorker {
            inner: Arc::new(Inner {
                queue,
                api,
                network,
                emitter,
                device_id: device_id.into(),
                options,
                is_syncing: AtomicBool::new(false),
                state: Mutex::new(CycleState::default()),
                listeners: Arc::new(ListenerRegistry::new()),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn queue(&self) -> &SyncQueueRepository {
        &self.inner.queue
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the periodic loop. Returns false if it was already running.
    ///
    /// Syncs once immediately, then every `interval` and on every
    /// Offline → Online transition until [`SyncWorker::stop`].
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = lock(&self.inner.running);
        if running.is_some() {
            debug!("Sync worker already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.clone().run(interval, shutdown_rx));
        *running = Some(RunningLoop {
            handle,
            shutdown_tx,
        });

        info!(interval_ms = interval.as_millis() as u64, "Sync worker started");
        true
    }

    /// Stops the periodic loop, letting an in-flight cycle finish.
    /// Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let running = lock(&self.inner.running).take();
        match running {
            Some(RunningLoop {
                handle,
                shutdown_tx,
            }) => {
                let _ = shutdown_tx.send(()).await;
                if let Err(e) = handle.await {
                    warn!(error = %e, "Sync worker task ended abnormally");
                }
                info!("Sync worker stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running).is_some()
    }

    async fn run(self, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut transitions = self.inner.network.online_transitions();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.sync().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync().await;
                }

                Some(()) = transitions.next() => {
                    info!("Back online, syncing");
                    self.sync().await;
                }

                _ = shutdown_rx.recv() => {
                    debug!("Sync worker received shutdown signal");
                    break;
                }
            }
        }
    }

    // =========================================================================
    // Sync Cycle
    // =========================================================================

    /// Runs one push/pull cycle unless offline or one is already running.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.inner.network.is_online() {
            debug!("Offline, sync skipped");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }

        if self
            .inner
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }

        let guard = SyncingGuard(&self.inner.is_syncing);
        self.notify().await;

        let outcome = match self.run_cycle().await {
            Ok((pushed, rejected, pulled)) => {
                let mut state = lock(&self.inner.state);
                state.last_sync_at = Some(Utc::now());
                state.error = None;
                SyncOutcome::Completed {
                    pushed,
                    rejected,
                    pulled,
                }
            }
            Err(e) => {
                warn!(error = %e, "Sync cycle failed");
                let reason = e.to_string();
                lock(&self.inner.state).error = Some(reason.clone());
                SyncOutcome::Failed { reason }
            }
        };

        drop(guard);
        self.notify().await;

        debug!(?outcome, "Sync cycle finished");
        outcome
    }

    async fn run_cycle(&self) -> SyncResult<(usize, usize, usize)> {
        let (pushed, rejected) = self.push().await?;
        let pulled = self.pull().await;
        Ok((pushed, rejected, pulled))
    }

    async fn push(&self) -> SyncResult<(usize, usize)> {
        let batch = self.inner.queue.get_unsynced().await?;
        if batch.is_empty() {
            return Ok((0, 0));
        }

        let ids: Vec<String> = batch.iter().map(|a| a.id.clone()).collect();
        let request = PushRequest::new(self.inner.device_id.as_str(), &batch);
        debug!(count = batch.len(), "Pushing sync actions");

        match self.inner.api.push(&request).await {
            Ok(response) => {
                for (id, message) in &response.errors {
                    warn!(action_id = %id, error = %message, "Server rejected action");
                }

                let outcome = self
                    .inner
                    .queue
                    .record_push_outcome(&response.processed_ids, &response.failed_ids)
                    .await?;
                self.report_exhausted(outcome.newly_exhausted);

                if rand::random::<f64>() < self.inner.options.compaction_probability {
                    if let Err(e) = self.inner.queue.clear_synced().await {
                        warn!(error = %e, "Failed to compact sync queue");
                    }
                }

                info!(synced = outcome.synced, failed = outcome.failed, "Push complete");
                Ok((outcome.synced, outcome.failed))
            }
            Err(e) => {
                warn!(error = %e, count = ids.len(), "Push failed");
                let outcome = self.inner.queue.record_push_outcome(&[], &ids).await?;
                self.report_exhausted(outcome.newly_exhausted);
                Err(e)
            }
        }
    }

    async fn pull(&self) -> usize {
        let since = lock(&self.inner.state).last_sync_at;

        match self.inner.api.pull(since).await {
            Ok(response) => {
                if response.has_more {
                    debug!("Server reports more changes; next cycle continues");
                }
                let count = response.changes.len();
                if count > 0 {
                    info!(count, "Pulled server changes");
                    self.inner
                        .emitter
                        .emit(&UiEvent::ChangesPulled(response.changes));
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "Pull failed");
                0
            }
        }
    }

    fn report_exhausted(&self, exhausted: Vec<sosy_core::SyncAction>) {
        for action in exhausted {
            warn!(
                id = %action.id,
                action_type = %action.action_type,
                retries = action.retry_count,
                "Sync action exhausted its retries"
            );
            self.inner
                .emitter
                .emit(&UiEvent::DeliveryAbandoned(AbandonedDelivery::Action(action)));
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing.load(Ordering::Acquire)
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.state).last_sync_at
    }

    pub async fn status(&self) -> SyncStatus {
        let pending_count = match self.inner.queue.get_unsynced().await {
            Ok(pending) => pending.len(),
            Err(e) => {
                warn!(error = %e, "Failed to read sync queue");
                0
            }
        };
        let state = lock(&self.inner.state);
        SyncStatus {
            is_syncing: self.is_syncing(),
            last_sync_at: state.last_sync_at,
            pending_count,
            error: state.error.clone(),
        }
    }

    /// Registers a status listener and calls it right away with the
    /// current status.
    pub async fn subscribe<F>(&self, listener: F) -> Subscription<SyncStatus>
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let status = self.status().await;
        let id = self.inner.listeners.add(listener);
        self.inner.listeners.notify_one(id, &status);
        Subscription::new(self.inner.listeners.clone(), id)
    }

    async fn notify(&self) {
        let status = self.status().await;
        self.inner.listeners.notify(&status);
    }
}

struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
