//! # Connection Monitor
//!
//! Tracks reachability of the remote store and publishes transitions.
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │          ┌─────────┐   report(Online)   ┌─────────┐                    │
//! │          │ UNKNOWN │ ─────────────────► │ ONLINE  │ ◄──┐               │
//! │          └────┬────┘                    └────┬────┘    │ reconnect:    │
//! │               │ report(Offline)              │         │ scheduler     │
//! │               ▼                              ▼         │ runs a sync   │
//! │          ┌─────────┐ ◄────────────────────────         │               │
//! │          │ OFFLINE │ ──────────────────────────────────┘               │
//! │          └─────────┘   sets is_offline_mode (sticky)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports come from the host (OS network events) or from the optional
//! [`ConnectionPinger`], which pings the remote store on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteTodoApi;
use crate::store::TodoStore;
use todo_core::{ConnectionStatus, TodoAction};

// =============================================================================
// Transition
// =============================================================================

/// A change of connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

impl Transition {
    /// Offline to online, the trigger for an automatic sync.
    pub fn is_reconnect(&self) -> bool {
        self.from == ConnectionStatus::Offline && self.to == ConnectionStatus::Online
    }
}

// =============================================================================
// Connection Monitor
// =============================================================================

/// Publishes connection status into the store and to subscribers.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    store: TodoStore,
    tx: Arc<watch::Sender<ConnectionStatus>>,
    /// Number of offline-to-online transitions seen so far.
    reconnects: Arc<watch::Sender<u64>>,
}

impl ConnectionMonitor {
    pub fn new(store: TodoStore) -> Self {
        let initial = store.read(|s| s.connection_status);
        let (tx, _rx) = watch::channel(initial);
        let (reconnects, _rx) = watch::channel(0);
        ConnectionMonitor {
            store,
            tx: Arc::new(tx),
            reconnects: Arc::new(reconnects),
        }
    }

    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Records an observed status. Returns the transition, if it was one.
    pub fn report(&self, status: ConnectionStatus) -> Option<Transition> {
        let from = self.current();
        if from == status {
            return None;
        }

        self.store
            .dispatch(TodoAction::SetConnectionStatus(status));
        self.tx.send_replace(status);

        let transition = Transition { from, to: status };
        info!(from = %from, to = %status, "Connection status changed");
        if transition.is_reconnect() {
            self.reconnects.send_modify(|n| *n += 1);
        }
        Some(transition)
    }

    /// Receives every subsequent status.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Receives the reconnect count. Rapid flaps between reads coalesce into
    /// one change, but a reconnect is never lost.
    pub fn subscribe_reconnects(&self) -> watch::Receiver<u64> {
        self.reconnects.subscribe()
    }
}

// =============================================================================
// Connection Pinger
// =============================================================================

/// Pings the remote store periodically and reports the result.
pub struct ConnectionPinger {
    monitor: ConnectionMonitor,
    remote: Arc<dyn RemoteTodoApi>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running pinger.
#[derive(Clone)]
pub struct ConnectionPingerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ConnectionPingerHandle {
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Pinger shutdown channel closed".into()))
    }
}

impl ConnectionPinger {
    pub fn new(
        monitor: ConnectionMonitor,
        remote: Arc<dyn RemoteTodoApi>,
        interval: Duration,
    ) -> (Self, ConnectionPingerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let pinger = ConnectionPinger {
            monitor,
            remote,
            interval,
            shutdown_rx,
        };
        (pinger, ConnectionPingerHandle { shutdown_tx })
    }

    /// Runs the pinger loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(interval = ?self.interval, "Connection pinger starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.ping_once().await,

                _ = self.shutdown_rx.recv() => {
                    info!("Connection pinger shutting down");
                    break;
                }
            }
        }
    }

    async fn ping_once(&self) {
        let status = match self.remote.ping().await {
            Ok(()) => ConnectionStatus::Online,
            Err(e) => {
                debug!(error = %e, "Ping failed");
                ConnectionStatus::Offline
            }
        };
        self.monitor.report(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryTodoApi;

    #[test]
    fn test_report_returns_transitions_only_on_change() {
        let store = TodoStore::default();
        let monitor = ConnectionMonitor::new(store.clone());
        assert_eq!(monitor.current(), ConnectionStatus::Unknown);

        let first = monitor.report(ConnectionStatus::Online).unwrap();
        assert!(!first.is_reconnect(), "unknown to online is not a reconnect");
        assert!(monitor.report(ConnectionStatus::Online).is_none());

        monitor.report(ConnectionStatus::Offline);
        let back = monitor.report(ConnectionStatus::Online).unwrap();
        assert!(back.is_reconnect());

        assert_eq!(store.read(|s| s.connection_status), ConnectionStatus::Online);
    }

    #[test]
    fn test_offline_mode_is_sticky_across_reconnect() {
        let store = TodoStore::default();
        let monitor = ConnectionMonitor::new(store.clone());

        monitor.report(ConnectionStatus::Offline);
        monitor.report(ConnectionStatus::Online);

        assert!(store.read(|s| s.is_offline_mode));
    }

    #[tokio::test]
    async fn test_reconnects_survive_coalescing() {
        let monitor = ConnectionMonitor::new(TodoStore::default());
        let mut reconnects = monitor.subscribe_reconnects();

        // Unknown -> Online is not counted
        monitor.report(ConnectionStatus::Online);
        assert!(!reconnects.has_changed().unwrap());

        // A flap with no await in between still registers
        monitor.report(ConnectionStatus::Offline);
        monitor.report(ConnectionStatus::Online);
        reconnects.changed().await.unwrap();
        assert_eq!(*reconnects.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_reports() {
        let monitor = ConnectionMonitor::new(TodoStore::default());
        let mut rx = monitor.subscribe();

        monitor.report(ConnectionStatus::Offline);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinger_follows_remote_reachability() {
        let store = TodoStore::default();
        let monitor = ConnectionMonitor::new(store.clone());
        let remote = Arc::new(InMemoryTodoApi::new());
        remote.set_offline(true).await;

        let mut rx = monitor.subscribe();
        let (pinger, handle) =
            ConnectionPinger::new(monitor.clone(), remote.clone(), Duration::from_secs(5));
        let task = tokio::spawn(pinger.run());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Offline);

        remote.set_offline(false).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Online);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
