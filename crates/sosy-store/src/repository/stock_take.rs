//! # Stock-Take Count Repository
//!
//! Local copy of counts entered during a stock-take session, kept so an
//! interrupted count survives a reload or a lost connection.

use sosy_core::validation::validate_stock_count;
use sosy_core::StockTakeCount;
use std::sync::Arc;
use tracing::debug;

use super::stock_take_key;
use crate::error::StoreResult;
use crate::kv::{load_json, update_json, KvStore};

/// Repository for per-session stock-take counts.
#[derive(Clone)]
pub struct StockTakeRepository {
    store: Arc<dyn KvStore>,
}

impl StockTakeRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        StockTakeRepository { store }
    }

    /// Merges `counts` into the session's stored counts.
    ///
    /// The last count for a product wins. Products keep their original
    /// position; new products are appended.
    pub async fn store_local_counts(
        &self,
        session_id: i64,
        counts: &[StockTakeCount],
    ) -> StoreResult<usize> {
        for count in counts {
            validate_stock_count(count)?;
        }

        let key = stock_take_key(session_id);
        let total = update_json(self.store.as_ref(), &key, |stored: &mut Vec<StockTakeCount>| {
            for count in counts {
                match stored.iter_mut().find(|c| c.product_id == count.product_id) {
                    Some(existing) => *existing = count.clone(),
                    None => stored.push(count.clone()),
                }
            }
            stored.len()
        })
        .await?;

        debug!(session_id, merged = counts.len(), total, "Stock-take counts stored");
        Ok(total)
    }

    /// Counts stored for a session, in entry order.
    pub async fn local_counts(&self, session_id: i64) -> StoreResult<Vec<StockTakeCount>> {
        load_json(self.store.as_ref(), &stock_take_key(session_id)).await
    }

    /// Forgets a session's local counts.
    pub async fn clear_local_counts(&self, session_id: i64) -> StoreResult<()> {
        self.store.remove(&stock_take_key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn count(product_id: i64, counted_qty: f64) -> StockTakeCount {
        StockTakeCount {
            session_id: 4,
            product_id,
            counted_qty,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_merge_last_wins_and_keeps_order() {
        let repo = StockTakeRepository::new(Arc::new(MemoryKvStore::new()));

        repo.store_local_counts(4, &[count(1, 10.0), count(2, 5.0)])
            .await
            .unwrap();
        let total = repo
            .store_local_counts(4, &[count(1, 12.0), count(3, 1.0)])
            .await
            .unwrap();

        assert_eq!(total, 3);
        let stored = repo.local_counts(4).await.unwrap();
        assert_eq!(
            stored.iter().map(|c| (c.product_id, c.counted_qty)).collect::<Vec<_>>(),
            vec![(1, 12.0), (2, 5.0), (3, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_and_clearable() {
        let repo = StockTakeRepository::new(Arc::new(MemoryKvStore::new()));
        repo.store_local_counts(4, &[count(1, 2.0)]).await.unwrap();

        assert!(repo.local_counts(5).await.unwrap().is_empty());

        repo.clear_local_counts(4).await.unwrap();
        assert!(repo.local_counts(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_count_rejected() {
        let repo = StockTakeRepository::new(Arc::new(MemoryKvStore::new()));
        assert!(repo.store_local_counts(4, &[count(1, -1.0)]).await.is_err());
        assert!(repo.local_counts(4).await.unwrap().is_empty());
    }
}
