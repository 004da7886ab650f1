//! # sosy-core: Pure Types for the SOSY Sync Engine
//!
//! Everything the sync engine agrees on before any byte hits storage or the
//! network: queue entry shapes, the retry/backoff policy, and input checks.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SOSY Sync Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Web UI (sync-* events, status)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        sosy-sync (worker, realtime, offline queue, API)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               sosy-store (durable key-value)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ sosy-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  backoff  │  │   error   │  │validation │  │   │
//! │  │   │ Queued-   │  │ Backoff-  │  │ CoreError │  │ endpoints │  │   │
//! │  │   │ Request   │  │ Policy    │  │           │  │ counts    │  │   │
//! │  │   │ SyncAction│  │           │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORAGE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue entries, status snapshot, stock-take counts
//! - [`backoff`] - Exponential retry policy shared by both retry paths
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use sosy_core::backoff::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::offline_queue();
//! assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
//! assert!(policy.is_exhausted(3));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use backoff::BackoffPolicy;
pub use error::{CoreError, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Replay attempts allowed for a deferred raw request before it is dropped.
pub const OFFLINE_QUEUE_MAX_RETRIES: u32 = 3;

/// Base delay for deferred request replay, doubled per recorded failure.
pub const OFFLINE_RETRY_DELAY_BASE_MS: u64 = 1000;

/// Push attempts allowed for a sync action before it stops being offered.
pub const SYNC_QUEUE_MAX_RETRIES: u32 = 5;

/// Most recent sync actions kept in storage; older ones are evicted first.
pub const SYNC_QUEUE_CAPACITY: usize = 1000;

/// Reconnect attempts for the realtime socket before giving up.
pub const REALTIME_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay for realtime reconnects.
pub const REALTIME_RECONNECT_DELAY_MS: u64 = 1000;

/// Heartbeat period on an open realtime socket.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default sync worker period.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 10_000;

/// Fixed HTTP timeout for API calls.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
