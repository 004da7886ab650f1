//! # Sync Queue Repository
//!
//! Persistence for domain sync actions awaiting push.
//!
//! ## Queue Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add(sale)  add(stock_update)  ...            oldest ──────► newest     │
//! │                                              [a0, a1, ..., a999]        │
//! │                                                                         │
//! │  • At most `capacity` (1000) entries; every write evicts the oldest    │
//! │  • synced: false → true, never back                                    │
//! │  • get_unsynced = !synced && retry_count < max_retries (5)             │
//! │  • Exhausted entries stay stored but are no longer offered             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use sosy_core::{SyncAction, SyncActionType, SYNC_QUEUE_CAPACITY, SYNC_QUEUE_MAX_RETRIES};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::SYNC_QUEUE_KEY;
use crate::error::StoreResult;
use crate::kv::{load_json, update_json, KvStore};

/// Effect of one push response on the queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOutcome {
    /// Entries newly marked as synced.
    pub synced: usize,
    /// Entries whose retry counter was incremented.
    pub failed: usize,
    /// Entries that reached the retry cap in this write.
    pub newly_exhausted: Vec<SyncAction>,
}

/// Repository for the domain sync queue.
#[derive(Clone)]
pub struct SyncQueueRepository {
    store: Arc<dyn KvStore>,
    max_retries: u32,
    capacity: usize,
}

impl SyncQueueRepository {
    /// Creates a repository with the default retry cap and capacity.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        SyncQueueRepository {
            store,
            max_retries: SYNC_QUEUE_MAX_RETRIES,
            capacity: SYNC_QUEUE_CAPACITY,
        }
    }

    /// Overrides the retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the stored entry cap.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs `mutate` on the stored queue, then trims it to capacity.
    async fn update<R, F>(&self, mut mutate: F) -> StoreResult<R>
    where
        R: Send,
        F: FnMut(&mut Vec<SyncAction>) -> R + Send,
    {
        let capacity = self.capacity;
        update_json(self.store.as_ref(), SYNC_QUEUE_KEY, |queue: &mut Vec<SyncAction>| {
            let result = mutate(queue);
            truncate_to_capacity(queue, capacity);
            result
        })
        .await
    }

    /// Appends a new unsynced action and returns its id.
    pub async fn add(&self, action_type: SyncActionType, payload: Value) -> StoreResult<String> {
        let action = SyncAction::new(action_type, payload);
        let id = action.id.clone();

        self.update(|queue| queue.push(action.clone())).await?;

        debug!(id = %id, action_type = %action_type, "Sync action queued");
        Ok(id)
    }

    /// Every stored action, oldest first.
    pub async fn get_all(&self) -> StoreResult<Vec<SyncAction>> {
        load_json(self.store.as_ref(), SYNC_QUEUE_KEY).await
    }

    /// Actions still eligible for push, oldest first.
    pub async fn get_unsynced(&self) -> StoreResult<Vec<SyncAction>> {
        let max_retries = self.max_retries;
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|a| a.is_pending(max_retries))
            .collect())
    }

    /// Unsynced actions that ran out of retries.
    pub async fn exhausted(&self) -> StoreResult<Vec<SyncAction>> {
        let max_retries = self.max_retries;
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|a| !a.synced && a.retry_count >= max_retries)
            .collect())
    }

    /// Marks an action as synced. Unknown ids are ignored.
    pub async fn mark_synced(&self, id: &str) -> StoreResult<bool> {
        self.update(|queue| match queue.iter_mut().find(|a| a.id == id) {
            Some(action) => {
                action.synced = true;
                true
            }
            None => false,
        })
        .await
    }

    /// Increments the retry counter of an action. Unknown ids are ignored.
    pub async fn increment_retry(&self, id: &str) -> StoreResult<Option<u32>> {
        self.update(|queue| {
            queue.iter_mut().find(|a| a.id == id).map(|a| {
                a.retry_count += 1;
                a.retry_count
            })
        })
        .await
    }

    /// Applies a whole push response in one write.
    ///
    /// Ids in `processed` become synced; ids in `failed` get one more retry.
    /// Ids the queue no longer holds are ignored.
    pub async fn record_push_outcome(
        &self,
        processed: &[String],
        failed: &[String],
    ) -> StoreResult<PushOutcome> {
        let processed: HashSet<&str> = processed.iter().map(String::as_str).collect();
        let failed: HashSet<&str> = failed.iter().map(String::as_str).collect();
        let max_retries = self.max_retries;

        self.update(|queue| {
            let mut outcome = PushOutcome::default();
            for action in queue.iter_mut() {
                if processed.contains(action.id.as_str()) {
                    if !action.synced {
                        action.synced = true;
                        outcome.synced += 1;
                    }
                } else if failed.contains(action.id.as_str()) && !action.synced {
                    action.retry_count += 1;
                    outcome.failed += 1;
                    if action.retry_count == max_retries {
                        outcome.newly_exhausted.push(action.clone());
                    }
                }
            }
            outcome
        })
        .await
    }

    /// Removes one action. Returns false if it was not stored.
    pub async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.update(|queue| {
            let before = queue.len();
            queue.retain(|a| a.id != id);
            queue.len() != before
        })
        .await
    }

    /// Removes every synced action and returns how many were dropped.
    pub async fn clear_synced(&self) -> StoreResult<usize> {
        let removed = self
            .update(|queue| {
                let before = queue.len();
                queue.retain(|a| !a.synced);
                before - queue.len()
            })
            .await?;

        if removed > 0 {
            debug!(removed, "Compacted synced actions");
        }
        Ok(removed)
    }

    /// Drops every stored action.
    pub async fn clear(&self) -> StoreResult<()> {
        self.store.remove(SYNC_QUEUE_KEY).await
    }

    /// Replaces the stored queue, keeping only the most recent `capacity` entries.
    pub async fn save(&self, queue: Vec<SyncAction>) -> StoreResult<()> {
        self.update(|stored| {
            stored.clone_from(&queue);
        })
        .await
    }
}

/// Drops the oldest entries until at most `capacity` remain.
fn truncate_to_capacity(queue: &mut Vec<SyncAction>, capacity: usize) {
    if queue.len() > capacity {
        let excess = queue.len() - capacity;
        warn!(excess, capacity, "Sync queue full, evicting oldest actions");
        queue.drain(..excess);
    }
}
