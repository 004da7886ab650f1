//! # Credential Store
//!
//! The bearer token attached to API calls. Cleared when the server answers 401.

use std::sync::Arc;

use super::AUTH_TOKEN_KEY;
use crate::error::StoreResult;
use crate::kv::KvStore;

#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        CredentialStore { store }
    }

    pub async fn token(&self) -> StoreResult<Option<String>> {
        Ok(self
            .store
            .get(AUTH_TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty()))
    }

    pub async fn set_token(&self, token: &str) -> StoreResult<()> {
        self.store.set(AUTH_TOKEN_KEY, token).await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.remove(AUTH_TOKEN_KEY).await
    }
}
