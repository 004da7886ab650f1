//! # sosy-sync: Sync Engine for SOSY
//!
//! Keeps a SOSY client usable without a network: mutating requests made
//! while offline are queued and replayed, domain actions are pushed and
//! server changes pulled on an interval, and realtime notifications from the
//! server are re-dispatched as UI events.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (Main Orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  Builds every component from SyncConfig + KvStore                │  │
//! │  │  Starts/stops the background tasks                               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   ApiClient    │  │   SyncWorker   │  │   RealtimeClient       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Bearer token   │  │ POST /sync/push│  │ /ws/<business_id>      │    │
//! │  │ 401 → expired  │  │ GET /sync/pull │  │ 30s heartbeat          │    │
//! │  │ Offline → queue│  │ every 10s      │  │ 5 reconnect attempts   │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          ▼                                                              │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  OfflineQueue  │  │ NetworkMonitor │  │   StockTakeSync        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Replays on     │◄─│ Online/Offline │  │ Local counts +         │    │
//! │  │ reconnect      │  │ transitions    │  │ stock_update actions   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  UI EVENTS (via SyncEventEmitter):                                     │
//! │  • "sync-changes"          - pulled server changes                     │
//! │  • "sync-sale-created"     - realtime sale notification                │
//! │  • "sync-stock-updated"    - realtime stock notification               │
//! │  • "sync-product-updated"  - realtime product notification             │
//! │  • "session-expired"       - credentials rejected with 401             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent` orchestrator and builder
//! - [`api`] - Intercepting HTTP client and the `/sync/*` endpoints
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - Sync error types
//! - [`events`] - UI events and emitters
//! - [`listeners`] - Callback registries with stable ids
//! - [`network`] - Reachability state and probe
//! - [`offline`] - Offline request queue drain
//! - [`protocol`] - REST and WebSocket message types
//! - [`realtime`] - WebSocket client with heartbeat and reconnection
//! - [`stock_take`] - Stock-take counts
//! - [`worker`] - Periodic push/pull worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sosy_store::{SqliteStore, StoreConfig};
//! use sosy_sync::{SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load(None)?;
//! let store = Arc::new(SqliteStore::open(StoreConfig::new("sosy.db")).await?);
//!
//! let agent = SyncAgent::builder(config, store).build().await?;
//! agent.start()?;
//! agent.connect_session(business_id, user_id).await?;
//!
//! let status = agent.worker().status().await;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod listeners;
pub mod network;
pub mod offline;
pub mod protocol;
pub mod realtime;
pub mod stock_take;
pub mod worker;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{SyncAgent, SyncAgentBuilder};
pub use api::{ApiClient, ApiRequest, ApiResponse, ApiTransport, ReqwestTransport, SyncApi};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use events::{AbandonedDelivery, BroadcastEmitter, NoOpEmitter, SyncEventEmitter, UiEvent};
pub use listeners::{ListenerId, Subscription};
pub use network::{NetworkMonitor, NetworkState};
pub use offline::{DrainReport, OfflineQueue};
pub use protocol::{ClientMessage, ServerMessage};
pub use realtime::{ConnectionState, RealtimeClient, RealtimeConfig};
pub use stock_take::StockTakeSync;
pub use worker::{SkipReason, SyncOutcome, SyncWorker, WorkerOptions};
