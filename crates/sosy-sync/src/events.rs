//! # UI Events
//!
//! Notifications from the sync engine to the host application.
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────┬─────────────────────┐
//! │ Event                    │ Name                     │ Source              │
//! ├──────────────────────────┼──────────────────────────┼─────────────────────┤
//! │ ChangesPulled            │ sync-changes             │ SyncWorker pull     │
//! │ SaleCreated              │ sync-sale-created        │ realtime            │
//! │ StockUpdated             │ sync-stock-updated       │ realtime            │
//! │ ProductUpdated           │ sync-product-updated     │ realtime            │
//! │ SessionExpired           │ session-expired          │ ApiClient (401)     │
//! │ DeliveryAbandoned        │ sync-delivery-abandoned  │ either queue        │
//! └──────────────────────────┴──────────────────────────┴─────────────────────┘
//! ```

use serde_json::Value;
use sosy_core::{QueuedRequest, SyncAction};
use tokio::sync::broadcast;
use tracing::trace;

use crate::protocol::SyncChange;

/// Something the host application may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ChangesPulled(Vec<SyncChange>),
    SaleCreated(Value),
    StockUpdated(Value),
    ProductUpdated(Value),
    /// Credentials were rejected and cleared; the user must sign in again.
    SessionExpired,
    /// An entry ran out of retries and will not be delivered.
    DeliveryAbandoned(AbandonedDelivery),
}

/// The entry a [`UiEvent::DeliveryAbandoned`] refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum AbandonedDelivery {
    Request(QueuedRequest),
    Action(SyncAction),
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::ChangesPulled(_) => "sync-changes",
            UiEvent::SaleCreated(_) => "sync-sale-created",
            UiEvent::StockUpdated(_) => "sync-stock-updated",
            UiEvent::ProductUpdated(_) => "sync-product-updated",
            UiEvent::SessionExpired => "session-expired",
            UiEvent::DeliveryAbandoned(_) => "sync-delivery-abandoned",
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Sink for UI events (implemented by the host integration).
pub trait SyncEventEmitter: Send + Sync {
    fn emit(&self, event: &UiEvent);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit(&self, _event: &UiEvent) {}
}

/// Fans events out to any number of tokio broadcast receivers.
///
/// Events emitted while nobody is subscribed are dropped.
pub struct BroadcastEmitter {
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastEmitter { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SyncEventEmitter for BroadcastEmitter {
    fn emit(&self, event: &UiEvent) {
        if self.tx.send(event.clone()).is_err() {
            trace!(event = event.name(), "No UI subscribers");
        }
    }
}
