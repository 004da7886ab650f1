//! # Key-Value Store
//!
//! The storage seam of the engine: string keys, string (JSON) values.
//!
//! ## Read-Modify-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 update_json(store, key, mutate)                         │
//! │                                                                         │
//! │   ┌──────────┐     ┌────────────┐     ┌──────────────────────────┐     │
//! │   │ get(key) │ ──► │ mutate(&T) │ ──► │ compare_and_swap(key,    │     │
//! │   │  = raw   │     │            │     │   expected = raw, new)   │     │
//! │   └──────────┘     └────────────┘     └────────────┬─────────────┘     │
//! │        ▲                                           │                    │
//! │        │               lost the race               │ swapped            │
//! │        └───────────────────────────────────────────┤                    │
//! │                                                    ▼                    │
//! │                                                 done (R)                │
//! │                                                                         │
//! │  Two tasks (or two processes on one SQLite file) mutating the same     │
//! │  queue can no longer overwrite each other's changes.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Attempts before a contended read-modify-write gives up.
const MAX_SWAP_ATTEMPTS: usize = 16;

/// Durable string key-value storage.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Atomically replaces the value under `key` with `new` if the current
    /// value equals `expected` (`None` meaning "key absent").
    ///
    /// Returns false when another writer got there first.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StoreResult<bool>;
}

// =============================================================================
// JSON Helpers
// =============================================================================

/// Parses a stored document, treating corrupt data as absent.
fn parse_or_default<T>(key: &str, raw: Option<&str>) -> T
where
    T: DeserializeOwned + Default,
{
    match raw {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "Corrupt stored document, treating as empty");
            T::default()
        }),
        None => T::default(),
    }
}

/// Loads the JSON document under `key`, or `T::default()` when absent or corrupt.
pub async fn load_json<T>(store: &dyn KvStore, key: &str) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    let raw = store.get(key).await?;
    Ok(parse_or_default(key, raw.as_deref()))
}

/// Overwrites the JSON document under `key`.
pub async fn save_json<T>(store: &dyn KvStore, key: &str, value: &T) -> StoreResult<()>
where
    T: Serialize + Sync,
{
    let raw = serde_json::to_string(value).map_err(|e| StoreError::serialization(key, e))?;
    store.set(key, &raw).await
}

/// Applies `mutate` to the document under `key` and writes it back atomically.
///
/// `mutate` may run more than once if concurrent writers interfere, so it
/// must only touch the value it is given. Nothing is written when the
/// mutation leaves the document unchanged.
pub async fn update_json<T, R, F>(store: &dyn KvStore, key: &str, mut mutate: F) -> StoreResult<R>
where
    T: DeserializeOwned + Serialize + Default + Send,
    R: Send,
    F: FnMut(&mut T) -> R + Send,
{
    for attempt in 1..=MAX_SWAP_ATTEMPTS {
        let raw = store.get(key).await?;

        let (result, new_raw) = {
            let mut value: T = parse_or_default(key, raw.as_deref());
            let result = mutate(&mut value);
            let new_raw =
                serde_json::to_string(&value).map_err(|e| StoreError::serialization(key, e))?;
            (result, new_raw)
        };

        if raw.as_deref() == Some(new_raw.as_str()) {
            return Ok(result);
        }

        if store.compare_and_swap(key, raw.as_deref(), &new_raw).await? {
            return Ok(result);
        }

        debug!(key, attempt, "Concurrent write detected, retrying");
    }

    Err(StoreError::Contention {
        key: key.to_string(),
    })
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Process-local store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), new.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_compare_and_swap() {
        let store = MemoryKvStore::new();

        assert!(store.compare_and_swap("k", None, "1").await.unwrap());
        assert!(!store.compare_and_swap("k", None, "2").await.unwrap());
        assert!(!store.compare_and_swap("k", Some("0"), "2").await.unwrap());
        assert!(store.compare_and_swap("k", Some("1"), "2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_corrupt_document_loads_as_default() {
        let store = MemoryKvStore::new();
        store.set("queue", "{not json").await.unwrap();

        let loaded: Vec<u32> = load_json(&store, "queue").await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(MemoryKvStore::new());

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                update_json(store.as_ref(), "numbers", |v: &mut Vec<u32>| v.push(i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut numbers: Vec<u32> = load_json(store.as_ref(), "numbers").await.unwrap();
        numbers.sort_unstable();
        assert_eq!(numbers, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_update_on_missing_key_creates_document() {
        let store = MemoryKvStore::new();
        let len = update_json(&store, "empty", |v: &mut Vec<u32>| v.len())
            .await
            .unwrap();

        assert_eq!(len, 0);
        assert_eq!(store.get("empty").await.unwrap().as_deref(), Some("[]"));
    }
}
