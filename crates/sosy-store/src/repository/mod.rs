//! # Repository Module
//!
//! Typed views over the key-value store, one per persisted document.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key                              value                                 │
//! │  ───────────────────────────────  ─────────────────────────────────     │
//! │  sosy_offline_queue               [QueuedRequest, ...]   (FIFO)        │
//! │  sosy_sync_queue                  [SyncAction, ...]      (≤ 1000)      │
//! │  stock_take_<sessionId>_counts    [StockTakeCount, ...]                │
//! │  sosy_draft_<key>                 {data, timestamp}      (7 days)      │
//! │  device_id                        "device_<ms>_<base36>"               │
//! │  auth_token                       "<bearer token>"                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every repository takes an `Arc<dyn KvStore>`, so the same code runs on
//! [`SqliteStore`](crate::SqliteStore) and [`MemoryKvStore`](crate::MemoryKvStore).

pub mod credentials;
pub mod device;
pub mod draft;
pub mod offline_queue;
pub mod stock_take;
pub mod sync_queue;

/// Storage key of the offline request queue.
pub const OFFLINE_QUEUE_KEY: &str = "sosy_offline_queue";

/// Storage key of the domain sync queue.
pub const SYNC_QUEUE_KEY: &str = "sosy_sync_queue";

/// Storage key of the persisted device identifier.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Storage key of the bearer credential.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage key holding local counts for one stock-take session.
pub fn stock_take_key(session_id: i64) -> String {
    format!("stock_take_{}_counts", session_id)
}

/// Storage key of the form draft saved under `key`.
pub fn draft_key(key: &str) -> String {
    format!("sosy_draft_{}", key)
}
