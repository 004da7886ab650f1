//! # Stock-Take Sync
//!
//! Keeps stock-take counts usable offline: a local copy per session, plus
//! one `stock_update` sync action per count for the worker to push.

use sosy_core::validation::validate_stock_count;
use sosy_core::{StockTakeCount, SyncActionType};
use sosy_store::{KvStore, StockTakeRepository, SyncQueueRepository};
use std::sync::Arc;
use tracing::info;

use crate::error::SyncResult;

#[derive(Clone)]
pub struct StockTakeSync {
    counts: StockTakeRepository,
    queue: SyncQueueRepository,
}

impl StockTakeSync {
    pub fn new(store: Arc<dyn KvStore>, queue: SyncQueueRepository) -> Self {
        StockTakeSync {
            counts: StockTakeRepository::new(store),
            queue,
        }
    }

    /// Queues one `stock_update` action per count and returns their ids.
    ///
    /// Nothing is queued if any count is invalid.
    pub async fn queue_counts(&self, counts: &[StockTakeCount]) -> SyncResult<Vec<String>> {
        for count in counts {
            validate_stock_count(count)?;
        }

        let mut ids = Vec::with_capacity(counts.len());
        for count in counts {
            let payload = serde_json::to_value(count)?;
            ids.push(self.queue.add(SyncActionType::StockUpdate, payload).await?);
        }

        info!(count = ids.len(), "Stock-take counts queued for sync");
        Ok(ids)
    }

    pub async fn store_local_counts(
        &self,
        session_id: i64,
        counts: &[StockTakeCount],
    ) -> SyncResult<usize> {
        Ok(self.counts.store_local_counts(session_id, counts).await?)
    }

    pub async fn local_counts(&self, session_id: i64) -> SyncResult<Vec<StockTakeCount>> {
        Ok(self.counts.local_counts(session_id).await?)
    }

    pub async fn clear_local_counts(&self, session_id: i64) -> SyncResult<()> {
        Ok(self.counts.clear_local_counts(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sosy_store::MemoryKvStore;

    fn stock_take() -> (StockTakeSync, SyncQueueRepository) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let queue = SyncQueueRepository::new(store.clone());
        (StockTakeSync::new(store, queue.clone()), queue)
    }

    fn count(product_id: i64, counted_qty: f64) -> StockTakeCount {
        StockTakeCount {
            session_id: 11,
            product_id,
            counted_qty,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_queue_counts_adds_stock_updates() {
        let (sync, queue) = stock_take();

        let ids = sync
            .queue_counts(&[count(1, 4.0), count(2, 0.0)])
            .await
            .unwrap();

        let pending = queue.get_unsynced().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(pending.len(), 2);
        assert!(pending
            .iter()
            .all(|a| a.action_type == SyncActionType::StockUpdate));
        assert_eq!(
            pending[0].payload,
            json!({"session_id": 11, "product_id": 1, "counted_qty": 4.0})
        );
    }

    #[tokio::test]
    async fn test_invalid_count_queues_nothing() {
        let (sync, queue) = stock_take();

        assert!(sync
            .queue_counts(&[count(1, 4.0), count(2, -1.0)])
            .await
            .is_err());
        assert!(queue.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_counts_round_trip() {
        let (sync, _) = stock_take();

        sync.store_local_counts(11, &[count(1, 3.0), count(2, 5.0)])
            .await
            .unwrap();
        let total = sync.store_local_counts(11, &[count(1, 6.0)]).await.unwrap();
        assert_eq!(total, 2);

        let stored = sync.local_counts(11).await.unwrap();
        assert_eq!(stored[0].counted_qty, 6.0);

        sync.clear_local_counts(11).await.unwrap();
        assert!(sync.local_counts(11).await.unwrap().is_empty());
    }
}
