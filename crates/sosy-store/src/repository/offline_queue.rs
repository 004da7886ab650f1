//! # Offline Request Queue Repository
//!
//! Persistence for mutating API calls deferred while offline.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue(POST /sales)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  [ {id, method, url, data, timestamp, retries: 0} ]   (appended)       │
//! │       │                                                                 │
//! │       │ drain pass (sosy-sync)                                         │
//! │       ├── replay ok      → remove_many([id])                          │
//! │       ├── replay failed  → record_failure(id)   retries += 1          │
//! │       └── retries >= 3   → remove_many([id])   (never replayed)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use sosy_core::validation::validate_endpoint;
use sosy_core::{MutatingMethod, QueuedRequest};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::OFFLINE_QUEUE_KEY;
use crate::error::StoreResult;
use crate::kv::{load_json, update_json, KvStore};

/// Repository for the offline request queue.
#[derive(Clone)]
pub struct OfflineQueueRepository {
    store: Arc<dyn KvStore>,
}

impl OfflineQueueRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        OfflineQueueRepository { store }
    }

    /// Appends a request and returns the stored entry.
    pub async fn enqueue(
        &self,
        method: MutatingMethod,
        url: &str,
        data: Option<Value>,
    ) -> StoreResult<QueuedRequest> {
        validate_endpoint(url)?;

        let request = QueuedRequest::new(method, url, data);
        let entry = request.clone();

        update_json(self.store.as_ref(), OFFLINE_QUEUE_KEY, |queue: &mut Vec<QueuedRequest>| {
            queue.push(entry.clone());
        })
        .await?;

        debug!(id = %request.id, method = %request.method, url = %request.url, "Request deferred");
        Ok(request)
    }

    /// Removes one entry. Returns false if it was not queued.
    pub async fn dequeue(&self, id: &str) -> StoreResult<bool> {
        update_json(self.store.as_ref(), OFFLINE_QUEUE_KEY, |queue: &mut Vec<QueuedRequest>| {
            let before = queue.len();
            queue.retain(|r| r.id != id);
            queue.len() != before
        })
        .await
    }

    /// Returns every queued entry in FIFO order.
    pub async fn list_all(&self) -> StoreResult<Vec<QueuedRequest>> {
        load_json(self.store.as_ref(), OFFLINE_QUEUE_KEY).await
    }

    /// Number of queued entries.
    pub async fn len(&self) -> StoreResult<usize> {
        Ok(self.list_all().await?.len())
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Increments the retry counter of an entry.
    ///
    /// Returns the new count, or `None` if the entry is gone.
    pub async fn record_failure(&self, id: &str) -> StoreResult<Option<u32>> {
        update_json(self.store.as_ref(), OFFLINE_QUEUE_KEY, |queue: &mut Vec<QueuedRequest>| {
            queue.iter_mut().find(|r| r.id == id).map(|r| {
                r.retries += 1;
                r.retries
            })
        })
        .await
    }

    /// Removes all entries whose id is in `ids`, applied to the current
    /// stored queue so entries added meanwhile survive.
    pub async fn remove_many(&self, ids: &[String]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();

        update_json(self.store.as_ref(), OFFLINE_QUEUE_KEY, |queue: &mut Vec<QueuedRequest>| {
            let before = queue.len();
            queue.retain(|r| !ids.contains(r.id.as_str()));
            before - queue.len()
        })
        .await
    }

    /// Drops every queued entry.
    pub async fn clear(&self) -> StoreResult<()> {
        self.store.remove(OFFLINE_QUEUE_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use serde_json::json;

    fn repo() -> OfflineQueueRepository {
        OfflineQueueRepository::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_enqueue_preserves_fifo_order() {
        let repo = repo();
        let a = repo
            .enqueue(MutatingMethod::Post, "/sales", Some(json!({"n": 1})))
            .await
            .unwrap();
        let b = repo
            .enqueue(MutatingMethod::Delete, "/products/3", None)
            .await
            .unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec![
            a.id.as_str(),
            b.id.as_str()
        ]);
        assert_eq!(all[0].retries, 0);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_bad_url() {
        let repo = repo();
        assert!(repo.enqueue(MutatingMethod::Post, "", None).await.is_err());
        assert!(repo.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_failure_and_dequeue() {
        let repo = repo();
        let entry = repo
            .enqueue(MutatingMethod::Put, "/invoices/9", Some(json!({})))
            .await
            .unwrap();

        assert_eq!(repo.record_failure(&entry.id).await.unwrap(), Some(1));
        assert_eq!(repo.record_failure(&entry.id).await.unwrap(), Some(2));
        assert_eq!(repo.record_failure("missing").await.unwrap(), None);

        assert!(repo.dequeue(&entry.id).await.unwrap());
        assert!(!repo.dequeue(&entry.id).await.unwrap());
        assert_eq!(repo.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_many_keeps_new_entries() {
        let repo = repo();
        let first = repo.enqueue(MutatingMethod::Post, "/a", None).await.unwrap();
        let snapshot: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        let late = repo.enqueue(MutatingMethod::Post, "/b", None).await.unwrap();

        assert_eq!(repo.remove_many(&snapshot).await.unwrap(), 1);
        let remaining = repo.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, late.id);
        assert_ne!(remaining[0].id, first.id);
    }
}
