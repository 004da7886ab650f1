//! # sosy-store: Durable Storage for the SOSY Sync Engine
//!
//! Stores the offline request queue, the sync queue, stock-take counts, the
//! device id and the bearer credential as JSON documents in a key-value table.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SOSY Sync Data Flow                              │
//! │                                                                         │
//! │  SyncWorker / OfflineQueue / ApiClient (sosy-sync)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    sosy-store (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   KvStore     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (kv.rs)     │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ OfflineQueue  │    │              │  │   │
//! │  │   │ SqliteStore   │◄───│ SyncQueue     │    │ 001_kv_store │  │   │
//! │  │   │ MemoryKvStore │    │ StockTake ... │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sosy_store::{SqliteStore, StoreConfig, SyncQueueRepository};
//!
//! let store = Arc::new(SqliteStore::open(StoreConfig::new("sosy.db")).await?);
//! let queue = SyncQueueRepository::new(store);
//! queue.add(SyncActionType::Sale, payload).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kv;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use kv::{KvStore, MemoryKvStore};
pub use pool::{SqliteStore, StoreConfig};

pub use repository::credentials::CredentialStore;
pub use repository::device::DeviceIdentity;
pub use repository::draft::DraftRepository;
pub use repository::offline_queue::OfflineQueueRepository;
pub use repository::stock_take::StockTakeRepository;
pub use repository::sync_queue::{PushOutcome, SyncQueueRepository};
