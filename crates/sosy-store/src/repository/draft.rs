//! # Draft Repository
//!
//! Half-finished form input kept across reloads. A draft is stored with the
//! time it was saved and is discarded on the first read after it expires.
//!
//! ```text
//! sosy_draft_<key>  →  { "data": <any JSON>, "timestamp": <ms since epoch> }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::draft_key;
use crate::error::{StoreError, StoreResult};
use crate::kv::{save_json, KvStore};

/// Drafts older than this are dropped when read.
pub const DRAFT_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct StoredDraft {
    data: Value,
    timestamp: i64,
}

/// Repository for form drafts.
#[derive(Clone)]
pub struct DraftRepository {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl DraftRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        DraftRepository {
            store,
            ttl: Duration::days(DRAFT_TTL_DAYS),
        }
    }

    /// Saves `data` as the draft for `key`, replacing any previous one.
    pub async fn save<T: Serialize>(&self, key: &str, data: &T) -> StoreResult<()> {
        self.save_at(key, data, Utc::now()).await
    }

    /// Saves a draft stamped with `saved_at`.
    pub async fn save_at<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        saved_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let storage_key = draft_key(key);
        let data =
            serde_json::to_value(data).map_err(|e| StoreError::serialization(&storage_key, e))?;
        let draft = StoredDraft {
            data,
            timestamp: saved_at.timestamp_millis(),
        };
        save_json(self.store.as_ref(), &storage_key, &draft).await?;
        debug!(key, "Draft saved");
        Ok(())
    }

    /// The draft for `key`, or `None` when absent, expired or unreadable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.get_at(key, Utc::now()).await
    }

    /// Reads the draft as of `now`. An expired draft is removed.
    pub async fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<T>> {
        let storage_key = draft_key(key);
        let Some(raw) = self.store.get(&storage_key).await? else {
            return Ok(None);
        };

        let draft: StoredDraft = match serde_json::from_str(&raw) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(key, error = %e, "Unreadable draft ignored");
                return Ok(None);
            }
        };

        if now.timestamp_millis() - draft.timestamp > self.ttl.num_milliseconds() {
            debug!(key, "Draft expired, removing");
            self.store.remove(&storage_key).await?;
            return Ok(None);
        }

        match serde_json::from_value(draft.data) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!(key, error = %e, "Draft does not match the requested shape");
                Ok(None)
            }
        }
    }

    pub async fn clear(&self, key: &str) -> StoreResult<()> {
        self.store.remove(&draft_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use serde_json::json;

    fn drafts() -> (Arc<dyn KvStore>, DraftRepository) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        (store.clone(), DraftRepository::new(store))
    }

    #[tokio::test]
    async fn test_saved_draft_is_returned() {
        let (store, drafts) = drafts();
        let form = json!({"customer": "Ama", "items": [{"sku": "X", "qty": 2}]});

        drafts.save("new_sale", &form).await.unwrap();

        assert_eq!(drafts.get::<Value>("new_sale").await.unwrap(), Some(form));
        let raw = store.get("sosy_draft_new_sale").await.unwrap().unwrap();
        let raw: Value = serde_json::from_str(&raw).unwrap();
        assert!(raw["timestamp"].is_i64());
        assert_eq!(drafts.get::<Value>("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_draft_expires_after_seven_days() {
        let (store, drafts) = drafts();
        let saved_at = Utc::now();
        drafts.save_at("invoice", &json!({"n": 1}), saved_at).await.unwrap();

        let fresh = saved_at + Duration::days(DRAFT_TTL_DAYS);
        assert_eq!(
            drafts.get_at::<Value>("invoice", fresh).await.unwrap(),
            Some(json!({"n": 1}))
        );

        let stale = fresh + Duration::milliseconds(1);
        assert_eq!(drafts.get_at::<Value>("invoice", stale).await.unwrap(), None);
        assert_eq!(store.get("sosy_draft_invoice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_removes_draft() {
        let (_, drafts) = drafts();
        drafts.save("product", &json!({"name": "Rice"})).await.unwrap();

        drafts.clear("product").await.unwrap();

        assert_eq!(drafts.get::<Value>("product").await.unwrap(), None);
        drafts.clear("product").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_draft_reads_as_none() {
        let (store, drafts) = drafts();
        store.set("sosy_draft_broken", "{not json").await.unwrap();

        assert_eq!(drafts.get::<Value>("broken").await.unwrap(), None);
    }
}
