//! # Persistence
//!
//! Loads the engine state at startup and writes it back as it changes.
//!
//! ```text
//!  startup:   StateStorage::load ──► hydrate ──► TodoStore
//!                      │ error
//!                      └──► warn!, start from TodoState::default()
//!
//!  running:   TodoStore ──watch──► PersistenceWorker
//!                                     │ wait `debounce` (coalesces bursts)
//!                                     │ skip if persisted part unchanged
//!                                     ▼
//!                               StateStorage::save   (failure: warn!, retry
//!                                                     on the next change)
//! ```
//!
//! Storage failures are never fatal.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use todo_core::{PersistedState, TodoState};
use todo_db::Database;

// =============================================================================
// Storage Seam
// =============================================================================

/// Where the persisted part of the state lives.
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn load(&self) -> SyncResult<PersistedState>;
    async fn save(&self, state: &PersistedState) -> SyncResult<()>;
}

#[async_trait]
impl StateStorage for Database {
    async fn load(&self) -> SyncResult<PersistedState> {
        Ok(self.state().load().await?)
    }

    async fn save(&self, state: &PersistedState) -> SyncResult<()> {
        Ok(self.state().save(state).await?)
    }
}

/// Keeps the snapshot in memory. For tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Option<PersistedState>,
    saves: usize,
    failing: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PersistedState) -> Self {
        let storage = Self::default();
        storage.lock().snapshot = Some(snapshot);
        storage
    }

    /// Makes every load and save fail until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn snapshot(&self) -> Option<PersistedState> {
        self.lock().snapshot.clone()
    }

    /// Successful saves so far.
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load(&self) -> SyncResult<PersistedState> {
        let inner = self.lock();
        if inner.failing {
            return Err(SyncError::Storage("memory storage unavailable".into()));
        }
        Ok(inner.snapshot.clone().unwrap_or_default())
    }

    async fn save(&self, state: &PersistedState) -> SyncResult<()> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(SyncError::Storage("memory storage unavailable".into()));
        }
        inner.snapshot = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }
}

// =============================================================================
// Hydration
// =============================================================================

/// Loads the initial state. Any failure yields an empty state.
pub async fn hydrate(storage: &dyn StateStorage) -> TodoState {
    match storage.load().await {
        Ok(persisted) => {
            info!(
                todos = persisted.todos.len(),
                pending = persisted.pending_operations.len(),
                conflicts = persisted.conflicted_todos.len(),
                "Hydrated state from local storage"
            );
            TodoState::from_persisted(persisted)
        }
        Err(e) => {
            warn!(error = %e, "Failed to load local state, starting empty");
            TodoState::default()
        }
    }
}

// =============================================================================
// Persistence Worker
// =============================================================================

/// Saves the persisted part of the state whenever it changes.
pub struct PersistenceWorker {
    storage: Arc<dyn StateStorage>,
    rx: watch::Receiver<TodoState>,
    debounce: Duration,
    last_saved: Option<PersistedState>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the worker. Stopping flushes unsaved changes.
#[derive(Clone)]
pub struct PersistenceHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl PersistenceHandle {
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Persistence shutdown channel closed".into()))
    }
}

impl PersistenceWorker {
    /// `rx` should come from the store the state was hydrated into; its
    /// current value counts as already saved.
    pub fn new(
        storage: Arc<dyn StateStorage>,
        mut rx: watch::Receiver<TodoState>,
        debounce: Duration,
    ) -> (Self, PersistenceHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let last_saved = Some(rx.borrow_and_update().persisted());
        let worker = PersistenceWorker {
            storage,
            rx,
            debounce,
            last_saved,
            shutdown_rx,
        };
        (worker, PersistenceHandle { shutdown_tx })
    }

    /// Runs the worker loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(debounce = ?self.debounce, "Persistence worker starting");

        loop {
            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // Store dropped; write what we last saw
                        self.save_if_changed().await;
                        break;
                    }
                    if !self.debounce.is_zero() {
                        tokio::time::sleep(self.debounce).await;
                    }
                    self.save_if_changed().await;
                }

                _ = self.shutdown_rx.recv() => {
                    self.save_if_changed().await;
                    info!("Persistence worker shutting down");
                    break;
                }
            }
        }
    }

    async fn save_if_changed(&mut self) {
        let snapshot = self.rx.borrow_and_update().persisted();
        if self.last_saved.as_ref() == Some(&snapshot) {
            return;
        }

        match self.storage.save(&snapshot).await {
            Ok(()) => {
                debug!(
                    todos = snapshot.todos.len(),
                    pending = snapshot.pending_operations.len(),
                    "Saved local state"
                );
                self.last_saved = Some(snapshot);
            }
            Err(e) => warn!(error = %e, "Failed to save local state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TodoStore;
    use chrono::Utc;
    use todo_core::{
        ConnectionStatus, NewTodo, PendingOperation, TodoAction, TodoFilter,
    };
    use todo_db::DbConfig;

    fn add(store: &TodoStore, id: &str) {
        let todo = NewTodo::new(format!("todo {}", id)).into_todo(id.into(), "guest".into(), Utc::now());
        let op = PendingOperation::create(&todo, Utc::now());
        store.transact(|_| {
            vec![
                TodoAction::OptimisticAddTodo(todo),
                TodoAction::AddPendingOperation(op),
            ]
        });
    }

    #[tokio::test]
    async fn test_hydrate_from_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let store = TodoStore::default();
        add(&store, "a");
        db.save(&store.state().persisted()).await.unwrap();

        let state = hydrate(&db).await;
        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.pending_operations.len(), 1);
        assert_eq!(state.connection_status, ConnectionStatus::Unknown);
    }

    #[tokio::test]
    async fn test_hydrate_failure_starts_empty() {
        let storage = MemoryStorage::new();
        storage.set_failing(true);

        let state = hydrate(&storage).await;
        assert_eq!(state, TodoState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_debounces_bursts() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TodoStore::default();
        let (worker, handle) =
            PersistenceWorker::new(storage.clone(), store.subscribe(), Duration::from_millis(250));
        let task = tokio::spawn(worker.run());

        add(&store, "a");
        tokio::time::sleep(Duration::from_millis(10)).await;
        add(&store, "b");
        add(&store, "c");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(storage.saves(), 1);
        assert_eq!(storage.snapshot().unwrap().todos.len(), 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fields_do_not_trigger_saves() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TodoStore::default();
        let (worker, handle) =
            PersistenceWorker::new(storage.clone(), store.subscribe(), Duration::ZERO);
        let task = tokio::spawn(worker.run());

        store.dispatch(TodoAction::SetFilter(TodoFilter::default()));
        store.dispatch(TodoAction::SetConnectionStatus(ConnectionStatus::Online));
        store.dispatch(TodoAction::SyncStart);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(storage.saves(), 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried_on_next_change() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TodoStore::default();
        let (worker, handle) =
            PersistenceWorker::new(storage.clone(), store.subscribe(), Duration::ZERO);
        let task = tokio::spawn(worker.run());

        storage.set_failing(true);
        add(&store, "a");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(storage.snapshot().is_none());

        storage.set_failing(false);
        add(&store, "b");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(storage.snapshot().unwrap().todos.len(), 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_change() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TodoStore::default();
        let (worker, handle) =
            PersistenceWorker::new(storage.clone(), store.subscribe(), Duration::from_secs(60));
        let task = tokio::spawn(worker.run());

        add(&store, "a");
        tokio::task::yield_now().await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(storage.snapshot().unwrap().todos.len(), 1);
    }
}
