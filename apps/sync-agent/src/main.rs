//! # SOSY Sync Agent
//!
//! Headless process running the sync engine against a local SQLite store.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Agent Process                               │
//! │                                                                         │
//! │  sync.toml + SOSY_* ───► SyncAgent ───► REST /sync/* , WS /ws/<id>     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                     SQLite (sosy-sync.db)                               │
//! │                                                                         │
//! │  UI events are written to the log until Ctrl+C / SIGTERM.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `sync-agent [path/to/sync.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use sosy_store::{SqliteStore, StoreConfig};
use sosy_sync::{BroadcastEmitter, SyncAgent, SyncConfig, UiEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting SOSY sync agent...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path)?;

    let db_path = config
        .database_path()
        .ok_or("No database path configured and no platform data directory")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = Arc::new(SqliteStore::open(StoreConfig::new(db_path)).await?);
    info!("Sync store ready");

    let emitter = Arc::new(BroadcastEmitter::default());
    let mut events = emitter.subscribe();

    let agent = SyncAgent::builder(config, store)
        .emitter(emitter)
        .build()
        .await?;
    agent.start()?;

    let session = &agent.config().session;
    if let (Some(business_id), Some(user_id)) = (session.business_id, session.user_id) {
        agent.connect_session(business_id, user_id).await?;
    } else {
        info!("No session configured, realtime stays disconnected");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "UI event log fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    agent.shutdown().await;
    info!("Sync agent shutdown complete");
    Ok(())
}

fn log_event(event: &UiEvent) {
    match event {
        UiEvent::ChangesPulled(changes) => {
            info!(event = event.name(), count = changes.len(), "Server changes pulled")
        }
        UiEvent::SessionExpired => warn!(event = event.name(), "Credentials rejected, sign in again"),
        UiEvent::DeliveryAbandoned(_) => warn!(event = event.name(), "Queued delivery abandoned"),
        _ => info!(event = event.name(), "Realtime event"),
    }
}

/// Initializes the tracing subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sosy_sync=debug,sosy_store=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
