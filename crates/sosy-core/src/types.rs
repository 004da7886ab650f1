//! # Domain Types
//!
//! Queue entries and snapshots shared by storage, the sync engine and the UI.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ QueuedRequest   │   │   SyncAction    │   │   SyncStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id (UUID)      │   │  is_syncing     │       │
//! │  │  method         │   │  type           │   │  last_sync_at   │       │
//! │  │  url, data      │   │  payload        │   │  pending_count  │       │
//! │  │  timestamp (ms) │   │  synced         │   │  error          │       │
//! │  │  retries (≤3)   │   │  retry_count(≤5)│   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │   raw API replay         domain push/pull      UI-facing snapshot       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two queues are deliberately independent: nothing orders a
//! `QueuedRequest` against a `SyncAction`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// HTTP Methods
// =============================================================================

/// HTTP method of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Returns true for methods that change server state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(CoreError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// The subset of methods that may be deferred and replayed.
///
/// Reads are never queued, so a `QueuedRequest` cannot hold a `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum MutatingMethod {
    Post,
    Put,
    Delete,
}

impl MutatingMethod {
    pub fn as_str(&self) -> &'static str {
        HttpMethod::from(*self).as_str()
    }
}

impl fmt::Display for MutatingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MutatingMethod> for HttpMethod {
    fn from(method: MutatingMethod) -> Self {
        match method {
            MutatingMethod::Post => HttpMethod::Post,
            MutatingMethod::Put => HttpMethod::Put,
            MutatingMethod::Delete => HttpMethod::Delete,
        }
    }
}

impl TryFrom<HttpMethod> for MutatingMethod {
    type Error = CoreError;

    fn try_from(method: HttpMethod) -> Result<Self, Self::Error> {
        match method {
            HttpMethod::Post => Ok(MutatingMethod::Post),
            HttpMethod::Put => Ok(MutatingMethod::Put),
            HttpMethod::Delete => Ok(MutatingMethod::Delete),
            HttpMethod::Get => Err(CoreError::UnsupportedMethod("GET".to_string())),
        }
    }
}

// =============================================================================
// Queued Request (offline request queue)
// =============================================================================

/// A mutating API call deferred while offline, replayed verbatim later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueuedRequest {
    /// Unique within the queue. Doubles as the idempotency key on replay.
    pub id: String,

    pub method: MutatingMethod,

    /// Endpoint path (relative to the API base) or absolute URL.
    pub url: String,

    /// JSON body, if the original call had one.
    #[serde(default)]
    #[ts(type = "unknown")]
    pub data: Option<Value>,

    /// Enqueue time, milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Failed replay attempts so far.
    #[serde(default)]
    pub retries: u32,
}

impl QueuedRequest {
    /// Creates a fresh entry stamped with the current time and zero retries.
    pub fn new(method: MutatingMethod, url: impl Into<String>, data: Option<Value>) -> Self {
        QueuedRequest {
            id: Uuid::new_v4().to_string(),
            method,
            url: url.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
            retries: 0,
        }
    }
}

// =============================================================================
// Sync Action (domain sync queue)
// =============================================================================

/// Kind of domain change carried by a [`SyncAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SyncActionType {
    Sale,
    StockUpdate,
    ProductUpdate,
    Invoice,
}

impl SyncActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncActionType::Sale => "sale",
            SyncActionType::StockUpdate => "stock_update",
            SyncActionType::ProductUpdate => "product_update",
            SyncActionType::Invoice => "invoice",
        }
    }
}

impl fmt::Display for SyncActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(SyncActionType::Sale),
            "stock_update" => Ok(SyncActionType::StockUpdate),
            "product_update" => Ok(SyncActionType::ProductUpdate),
            "invoice" => Ok(SyncActionType::Invoice),
            other => Err(CoreError::UnknownActionType(other.to_string())),
        }
    }
}

/// A domain-level change awaiting push to the server.
///
/// `synced` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncAction {
    /// UUID v4.
    pub id: String,

    #[serde(rename = "type")]
    pub action_type: SyncActionType,

    #[ts(type = "unknown")]
    pub payload: Value,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub synced: bool,

    /// Failed pushes so far.
    #[serde(default)]
    pub retry_count: u32,
}

impl SyncAction {
    pub fn new(action_type: SyncActionType, payload: Value) -> Self {
        SyncAction {
            id: Uuid::new_v4().to_string(),
            action_type,
            payload,
            created_at: Utc::now(),
            synced: false,
            retry_count: 0,
        }
    }

    /// Returns true if the action should still be offered to the server.
    #[inline]
    pub fn is_pending(&self, max_retries: u32) -> bool {
        !self.synced && self.retry_count < max_retries
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot of the sync worker handed to status listeners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatus {
    pub is_syncing: bool,

    /// Completion time of the last successful cycle.
    #[ts(as = "Option<String>")]
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Unsynced actions still eligible for push.
    pub pending_count: usize,

    /// Message of the last failed cycle, cleared by the next success.
    pub error: Option<String>,
}

// =============================================================================
// Stock Take
// =============================================================================

/// A counted quantity for one product within a stock-take session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockTakeCount {
    pub session_id: i64,
    pub product_id: i64,
    pub counted_qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
