//! # Device Identity
//!
//! One identifier per installation, generated on first use and persisted.
//! Push batches and the realtime connection both send it.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

use super::DEVICE_ID_KEY;
use crate::error::StoreResult;
use crate::kv::KvStore;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Persistent device identifier.
#[derive(Clone)]
pub struct DeviceIdentity {
    store: Arc<dyn KvStore>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        DeviceIdentity { store }
    }

    /// Returns the stored id, creating and persisting one if absent.
    ///
    /// Concurrent first calls agree on a single id.
    pub async fn get_or_create(&self) -> StoreResult<String> {
        if let Some(id) = self.get().await? {
            return Ok(id);
        }

        let candidate = generate_device_id();
        if self
            .store
            .compare_and_swap(DEVICE_ID_KEY, None, &candidate)
            .await?
        {
            info!(device_id = %candidate, "Generated device id");
            return Ok(candidate);
        }

        // Another writer won; use theirs.
        Ok(self.get().await?.unwrap_or(candidate))
    }

    /// Returns the stored id without creating one.
    pub async fn get(&self) -> StoreResult<Option<String>> {
        Ok(self
            .store
            .get(DEVICE_ID_KEY)
            .await?
            .filter(|id| !id.trim().is_empty()))
    }

    /// Pins the device id (e.g. from configuration).
    pub async fn set(&self, device_id: &str) -> StoreResult<()> {
        sosy_core::validation::validate_device_id(device_id)?;
        self.store.set(DEVICE_ID_KEY, device_id).await
    }
}

/// `device_<epoch-ms>_<9 base-36 chars>`
pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("device_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    #[tokio::test]
    async fn test_device_id_is_stable() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let identity = DeviceIdentity::new(store.clone());

        let first = identity.get_or_create().await.unwrap();
        let second = DeviceIdentity::new(store).get_or_create().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_id_format() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "device");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_pinned_id_wins() {
        let identity = DeviceIdentity::new(Arc::new(MemoryKvStore::new()));
        identity.set("register-1").await.unwrap();
        assert_eq!(identity.get_or_create().await.unwrap(), "register-1");
        assert!(identity.set("has space").await.is_err());
    }
}
