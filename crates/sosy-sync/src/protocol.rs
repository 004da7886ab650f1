//! # Sync Protocol Messages
//!
//! Wire types for the REST sync endpoints and the realtime channel.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Protocol Messages                             │
//! │                                                                         │
//! │  REST (request/response)                                               │
//! │  ───────────────────────                                               │
//! │  CLIENT ───► POST /sync/push   { device_id, actions: [...] }           │
//! │  CLIENT ◄─── { success, processed_ids, failed_ids, errors }            │
//! │                                                                         │
//! │  CLIENT ───► GET /sync/pull?since=<iso8601>                            │
//! │  CLIENT ◄─── { server_time, changes: [...], has_more }                 │
//! │                                                                         │
//! │  CLIENT ───► GET /sync/state                                           │
//! │  CLIENT ◄─── { last_sync_at, last_pull_at, sync_version }              │
//! │                                                                         │
//! │  REALTIME (WebSocket, JSON text frames)                                │
//! │  ──────────────────────────────────────                                │
//! │  CLIENT ───► { "type": "ping" }                      every 30s         │
//! │  CLIENT ───► { "type": "sync_event", event_type, payload }             │
//! │  SERVER ───► { "type": "connected" }                                   │
//! │  SERVER ───► { "type": "pong" }                      swallowed         │
//! │  SERVER ───► { "type": "SALE_CREATED", payload, timestamp }            │
//! │              STOCK_UPDATED, PRODUCT_UPDATED, INVOICE_CREATED,           │
//! │              PAYMENT_RECEIVED, anything else                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sosy_core::SyncAction;
use std::collections::HashMap;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// REST Endpoints
// =============================================================================

pub const PUSH_PATH: &str = "/sync/push";
pub const PULL_PATH: &str = "/sync/pull";
pub const STATE_PATH: &str = "/sync/state";

/// One action in a push batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushActionItem {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: Value,
    pub created_at: String,
}

impl From<&SyncAction> for PushActionItem {
    fn from(action: &SyncAction) -> Self {
        PushActionItem {
            id: action.id.clone(),
            action_type: action.action_type.as_str().to_string(),
            payload: action.payload.clone(),
            created_at: action.created_at.to_rfc3339(),
        }
    }
}

/// Body of `POST /sync/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub device_id: String,
    pub actions: Vec<PushActionItem>,
}

impl PushRequest {
    pub fn new(device_id: impl Into<String>, actions: &[SyncAction]) -> Self {
        PushRequest {
            device_id: device_id.into(),
            actions: actions.iter().map(PushActionItem::from).collect(),
        }
    }
}

/// Response of `POST /sync/push`. Ids absent from both lists are left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub processed_ids: Vec<String>,
    #[serde(default)]
    pub failed_ids: Vec<String>,
    /// Per-action error messages keyed by action id.
    #[serde(default)]
    pub errors: HashMap<String, String>,
}

/// A server-side change returned by pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncChange {
    #[serde(rename = "type")]
    pub change_type: String,
    pub entity_id: i64,
    #[serde(default)]
    pub data: Value,
    pub updated_at: String,
    pub action: String,
}

/// Response of `GET /sync/pull`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default)]
    pub changes: Vec<SyncChange>,
    #[serde(default)]
    pub has_more: bool,
}

/// Response of `GET /sync/state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStateResponse {
    #[serde(default)]
    pub last_sync_at: Option<String>,
    #[serde(default)]
    pub last_pull_at: Option<String>,
    #[serde(default)]
    pub sync_version: i64,
}

// =============================================================================
// Realtime Event Names
// =============================================================================

/// Local event emitted when the socket opens.
pub const EVENT_CONNECTED: &str = "connected";
/// Local event emitted when the socket closes or a connect attempt fails.
pub const EVENT_DISCONNECTED: &str = "disconnected";
/// Local event emitted on socket errors.
pub const EVENT_ERROR: &str = "error";

pub const SALE_CREATED: &str = "SALE_CREATED";
pub const STOCK_UPDATED: &str = "STOCK_UPDATED";
pub const PRODUCT_UPDATED: &str = "PRODUCT_UPDATED";
pub const INVOICE_CREATED: &str = "INVOICE_CREATED";
pub const PAYMENT_RECEIVED: &str = "PAYMENT_RECEIVED";

// =============================================================================
// Realtime: Server → Client
// =============================================================================

/// Raw envelope of every realtime frame.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// A message received on the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Server acknowledged the connection.
    Connected,
    /// Heartbeat reply.
    Pong,
    SaleCreated(Value),
    StockUpdated(Value),
    ProductUpdated(Value),
    InvoiceCreated(Value),
    PaymentReceived(Value),
    /// Any type this client does not know. Still delivered to listeners.
    Other { kind: String, payload: Value },
}

impl ServerMessage {
    /// Parses a text frame. Fails on non-JSON or a missing `type`.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        let payload = envelope.payload.unwrap_or(Value::Null);

        Ok(match envelope.kind.as_str() {
            "connected" => ServerMessage::Connected,
            "pong" => ServerMessage::Pong,
            SALE_CREATED => ServerMessage::SaleCreated(payload),
            STOCK_UPDATED => ServerMessage::StockUpdated(payload),
            PRODUCT_UPDATED => ServerMessage::ProductUpdated(payload),
            INVOICE_CREATED => ServerMessage::InvoiceCreated(payload),
            PAYMENT_RECEIVED => ServerMessage::PaymentReceived(payload),
            _ => ServerMessage::Other {
                kind: envelope.kind,
                payload,
            },
        })
    }

    /// Name listeners register under.
    pub fn event_name(&self) -> &str {
        match self {
            ServerMessage::Connected => EVENT_CONNECTED,
            ServerMessage::Pong => "pong",
            ServerMessage::SaleCreated(_) => SALE_CREATED,
            ServerMessage::StockUpdated(_) => STOCK_UPDATED,
            ServerMessage::ProductUpdated(_) => PRODUCT_UPDATED,
            ServerMessage::InvoiceCreated(_) => INVOICE_CREATED,
            ServerMessage::PaymentReceived(_) => PAYMENT_RECEIVED,
            ServerMessage::Other { kind, .. } => kind,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ServerMessage::Connected | ServerMessage::Pong => None,
            ServerMessage::SaleCreated(p)
            | ServerMessage::StockUpdated(p)
            | ServerMessage::ProductUpdated(p)
            | ServerMessage::InvoiceCreated(p)
            | ServerMessage::PaymentReceived(p)
            | ServerMessage::Other { payload: p, .. } => Some(p),
        }
    }
}

// =============================================================================
// Realtime: Client → Server
// =============================================================================

/// A message sent on the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    SyncEvent { event_type: String, payload: Value },
}

impl ClientMessage {
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Ping => "ping",
            ClientMessage::SyncEvent { .. } => "sync_event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sosy_core::SyncActionType;

    #[test]
    fn test_client_message_wire_shape() {
        assert_eq!(ClientMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);

        let event = ClientMessage::SyncEvent {
            event_type: "SALE_CREATED".into(),
            payload: json!({"id": 4}),
        };
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "sync_event", "event_type": "SALE_CREATED", "payload": {"id": 4}}));
    }

    #[test]
    fn test_server_message_routing() {
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"pong"}"#).unwrap(),
            ServerMessage::Pong
        );

        let msg = ServerMessage::from_json(
            r#"{"type":"STOCK_UPDATED","payload":{"product_id":7,"quantity":3},"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.event_name(), STOCK_UPDATED);
        assert_eq!(msg.payload(), Some(&json!({"product_id": 7, "quantity": 3})));
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let msg = ServerMessage::from_json(r#"{"type":"SHIFT_CLOSED","payload":1}"#).unwrap();
        assert_eq!(msg.event_name(), "SHIFT_CLOSED");
        assert_eq!(msg.payload(), Some(&json!(1)));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(ServerMessage::from_json("not json").is_err());
        assert!(ServerMessage::from_json(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn test_push_request_shape() {
        let action = SyncAction::new(SyncActionType::StockUpdate, json!({"product_id": 1}));
        let request = PushRequest::new("device_1", std::slice::from_ref(&action));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["device_id"], "device_1");
        assert_eq!(value["actions"][0]["type"], "stock_update");
        assert_eq!(value["actions"][0]["id"], action.id);
        assert!(value["actions"][0].get("synced").is_none());
    }

    #[test]
    fn test_responses_tolerate_missing_fields() {
        let push: PushResponse = serde_json::from_str(r#"{"processed_ids":["a"]}"#).unwrap();
        assert_eq!(push.processed_ids, vec!["a"]);
        assert!(push.failed_ids.is_empty());

        let pull: PullResponse = serde_json::from_str(
            r#"{"server_time":"2024-01-01T00:00:00Z","changes":[{"type":"product","entity_id":3,"data":{},"updated_at":"2024-01-01T00:00:00Z","action":"update"}]}"#,
        )
        .unwrap();
        assert_eq!(pull.changes.len(), 1);
        assert_eq!(pull.changes[0].change_type, "product");
        assert!(!pull.has_more);
    }
}
