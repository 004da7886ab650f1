//! # Network Reachability
//!
//! A shared online/offline flag with change notification.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   probe (GET /health) ──┐                                              │
//! │   host app signal ──────┼──► NetworkMonitor (watch channel)            │
//! │                         │         │                                     │
//! │                         │         ├──► ApiClient    (queue or fail)    │
//! │                         │         ├──► OfflineQueue (drain on online)  │
//! │                         │         └──► SyncWorker   (skip / sync now)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the Offline → Online transition is interesting to consumers; it is
//! exposed through [`OnlineTransitions`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Current reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Online => write!(f, "online"),
            NetworkState::Offline => write!(f, "offline"),
        }
    }
}

/// Shared reachability signal. Cheap to clone.
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _) = watch::channel(initial);
        NetworkMonitor { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::Online)
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::Offline)
    }

    pub fn state(&self) -> NetworkState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == NetworkState::Online
    }

    /// Updates reachability. Returns true if the state actually changed.
    pub fn set_state(&self, state: NetworkState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            info!(state = %state, "Network state changed");
        }
        changed
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.set_state(if online {
            NetworkState::Online
        } else {
            NetworkState::Offline
        })
    }

    /// Raw watch receiver for callers that care about every change.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }

    /// Stream of Offline → Online transitions.
    pub fn online_transitions(&self) -> OnlineTransitions {
        let rx = self.tx.subscribe();
        let last = *rx.borrow();
        OnlineTransitions { rx, last }
    }

    /// Spawns a task that probes `url` every `interval` and updates the state.
    ///
    /// Any HTTP response counts as reachable; only transport failures mark
    /// the device offline.
    pub fn spawn_probe(&self, client: reqwest::Client, url: Url, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let reachable = match client.get(url.clone()).send().await {
                    Ok(response) => {
                        debug!(status = %response.status(), "Reachability probe answered");
                        true
                    }
                    Err(e) => {
                        debug!(error = %e, "Reachability probe failed");
                        false
                    }
                };
                monitor.set_online(reachable);
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}

/// Yields once per Offline → Online transition.
///
/// Rapid flaps between polls are coalesced by the watch channel.
pub struct OnlineTransitions {
    rx: watch::Receiver<NetworkState>,
    last: NetworkState,
}

impl OnlineTransitions {
    /// Waits for the next transition. Returns `None` once every monitor
    /// handle has been dropped.
    pub async fn next(&mut self) -> Option<()> {
        loop {
            self.rx.changed().await.ok()?;
            let now = *self.rx.borrow_and_update();
            let was = std::mem::replace(&mut self.last, now);
            if was == NetworkState::Offline && now == NetworkState::Online {
                return Some(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_state_reports_changes() {
        let network = NetworkMonitor::online();
        assert!(network.is_online());

        assert!(!network.set_online(true));
        assert!(network.set_online(false));
        assert!(!network.is_online());
        assert!(!network.set_state(NetworkState::Offline));
    }

    #[tokio::test]
    async fn test_online_transition_fires_once() {
        let network = NetworkMonitor::offline();
        let mut transitions = network.online_transitions();

        let waiter = tokio::spawn(async move { transitions.next().await });
        tokio::task::yield_now().await;

        network.set_online(true);
        let fired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired, Some(()));
    }

    #[tokio::test]
    async fn test_going_offline_is_not_a_transition() {
        let network = NetworkMonitor::online();
        let mut transitions = network.online_transitions();

        network.set_online(false);
        let result =
            tokio::time::timeout(Duration::from_millis(50), transitions.next()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transitions_end_when_monitor_dropped() {
        let network = NetworkMonitor::online();
        let mut transitions = network.online_transitions();
        drop(network);
        assert_eq!(transitions.next().await, None);
    }
}
