//! # Todo Engine
//!
//! The facade a host application talks to. Owns the store and every
//! background task.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            TodoEngine                                   │
//! │                                                                         │
//! │   intents ──► Coordinator ──► OperationSequencer ──► RemoteTodoApi     │
//! │                   │                                        ▲            │
//! │                   ▼                                        │            │
//! │               TodoStore ◄──── SyncOrchestrator ────────────┘            │
//! │                │    ▲              ▲                                    │
//! │                │    │              │ reconnect / interval               │
//! │                │    │         SyncScheduler ◄── ConnectionMonitor       │
//! │                │    │                                ▲                  │
//! │                │    └── ConflictResolver             │ report()         │
//! │                ▼                                     │ ConnectionPinger │
//! │        PersistenceWorker ──► StateStorage (SQLite)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let engine = TodoEngineBuilder::new(EngineConfig::load_or_default(None))
//!     .with_remote(remote)
//!     .with_database(db)
//!     .build()
//!     .await?;
//!
//! let ticket = engine.add_todo(NewTodo::new("Buy milk"))?;
//! engine.report_connection(ConnectionStatus::Online);
//! engine.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthContext, StaticAuth};
use crate::config::EngineConfig;
use crate::connection::{ConnectionMonitor, ConnectionPinger, ConnectionPingerHandle, Transition};
use crate::coordinator::{Coordinator, MutationTicket};
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{SyncOrchestrator, SyncReport, SyncScheduler, SyncSchedulerHandle, SyncTriggers};
use crate::persistence::{hydrate, PersistenceHandle, PersistenceWorker, StateStorage};
use crate::remote::RemoteTodoApi;
use crate::resolver::{ConflictPolicy, ConflictResolver, ConflictStrategy};
use crate::store::TodoStore;
use todo_core::{
    ConflictedTodo, ConnectionStatus, LegacyFilter, NewTodo, Todo, TodoAction, TodoFilter,
    TodoPatch, TodoState, TodoStats,
};
use todo_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// A running sync engine.
pub struct TodoEngine {
    config: Arc<EngineConfig>,
    store: TodoStore,
    coordinator: Coordinator,
    orchestrator: Arc<SyncOrchestrator>,
    resolver: ConflictResolver,
    connection: ConnectionMonitor,

    scheduler: SyncSchedulerHandle,
    persistence: Option<PersistenceHandle>,
    pinger: Option<ConnectionPingerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl TodoEngine {
    pub fn builder(config: EngineConfig) -> TodoEngineBuilder {
        TodoEngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Intents
    // =========================================================================

    pub fn add_todo(&self, input: NewTodo) -> SyncResult<MutationTicket> {
        self.coordinator.add_todo(input)
    }

    pub fn update_todo(&self, id: &str, patch: TodoPatch) -> SyncResult<MutationTicket> {
        self.coordinator.update_todo(id, patch)
    }

    pub fn toggle_todo(&self, id: &str) -> SyncResult<MutationTicket> {
        self.coordinator.toggle_todo(id)
    }

    pub fn delete_todo(&self, id: &str) -> SyncResult<MutationTicket> {
        self.coordinator.delete_todo(id)
    }

    pub fn set_filter(&self, filter: TodoFilter) {
        self.store.dispatch(TodoAction::SetFilter(filter));
    }

    /// Accepts the plain-object filter older callers send.
    pub fn set_legacy_filter(&self, filter: LegacyFilter) {
        self.set_filter(filter.into());
    }

    // =========================================================================
    // Sync Control
    // =========================================================================

    /// Runs a sync pass now.
    pub async fn trigger_sync(&self) -> SyncResult<SyncReport> {
        self.orchestrator.sync().await
    }

    /// Clears accumulated sync errors, then runs a sync pass.
    pub async fn retry_sync(&self) -> SyncResult<SyncReport> {
        self.store.dispatch(TodoAction::ClearSyncErrors);
        self.orchestrator.sync().await
    }

    /// Stops a running pass at its next step.
    pub fn cancel_sync(&self) -> bool {
        self.orchestrator.cancel()
    }

    pub fn clear_errors(&self) {
        self.store.dispatch(TodoAction::ClearSyncErrors);
    }

    /// Sets the offline-mode flag. While enabled, intents are applied and
    /// queued but nothing reaches the remote store, and scheduled syncs are
    /// skipped. Leaving offline mode while reachable starts a sync pass and
    /// returns its report.
    pub async fn set_offline_mode(&self, enabled: bool) -> SyncResult<Option<SyncReport>> {
        self.coordinator.set_held_offline(enabled);
        self.store.dispatch(TodoAction::SetOfflineMode(enabled));
        info!(enabled, "Offline mode changed");

        if enabled || !self.store.read(|s| s.connection_status.is_reachable()) {
            return Ok(None);
        }
        match self.orchestrator.sync().await {
            Ok(report) => Ok(Some(report)),
            Err(SyncError::AlreadySyncing) => {
                debug!("Sync already running, nothing to start");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn toggle_offline_mode(&self) -> SyncResult<Option<SyncReport>> {
        let enabled = self.store.read(|s| s.is_offline_mode);
        self.set_offline_mode(!enabled).await
    }

    /// Feeds an observed connectivity change into the engine.
    pub fn report_connection(&self, status: ConnectionStatus) -> Option<Transition> {
        self.connection.report(status)
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    pub fn conflicts(&self) -> Vec<ConflictedTodo> {
        self.resolver.conflicts()
    }

    pub fn resolve_conflict(
        &self,
        todo_id: &str,
        strategy: ConflictStrategy,
    ) -> SyncResult<Option<MutationTicket>> {
        self.resolver.resolve(todo_id, strategy)
    }

    pub fn resolve_all_conflicts(
        &self,
        policy: &dyn ConflictPolicy,
    ) -> SyncResult<Vec<MutationTicket>> {
        self.resolver.resolve_all(policy)
    }

    pub fn clear_conflicts(&self) {
        self.resolver.clear();
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn state(&self) -> TodoState {
        self.store.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<TodoState> {
        self.store.subscribe()
    }

    pub fn visible_todos(&self) -> Vec<Todo> {
        self.store
            .read(|s| s.visible_todos().into_iter().cloned().collect())
    }

    pub fn stats(&self) -> TodoStats {
        self.store.read(TodoState::stats)
    }

    pub fn connection_status_text(&self) -> String {
        self.store.read(TodoState::connection_status_text)
    }

    pub fn sync_status_text(&self) -> String {
        self.store.read(TodoState::sync_status_text)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stops background tasks and flushes unsaved state.
    pub async fn shutdown(self) {
        info!("Shutting down todo engine");
        self.orchestrator.cancel();

        if let Err(e) = self.scheduler.shutdown().await {
            debug!(error = %e, "Scheduler already stopped");
        }
        if let Some(pinger) = &self.pinger {
            if let Err(e) = pinger.shutdown().await {
                debug!(error = %e, "Pinger already stopped");
            }
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.shutdown().await {
                debug!(error = %e, "Persistence worker already stopped");
            }
        }

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Todo engine stopped");
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`TodoEngine`]. Must be called inside a Tokio runtime.
pub struct TodoEngineBuilder {
    config: EngineConfig,
    remote: Option<Arc<dyn RemoteTodoApi>>,
    auth: Option<Arc<dyn AuthContext>>,
    storage: Option<Arc<dyn StateStorage>>,
    ping_interval: Option<Duration>,
}

impl TodoEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        TodoEngineBuilder {
            config,
            remote: None,
            auth: None,
            storage: None,
            ping_interval: None,
        }
    }

    /// Sets the remote todo API. Required.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTodoApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the auth context. Defaults to a full-access user with the
    /// configured user id.
    pub fn with_auth(mut self, auth: Arc<dyn AuthContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets where state is loaded from and saved to. Without one the
    /// engine starts empty and keeps nothing.
    pub fn with_storage(mut self, storage: Arc<dyn StateStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_database(self, db: Database) -> Self {
        self.with_storage(Arc::new(db))
    }

    /// Pings the remote store on this interval to detect connectivity.
    pub fn with_pinger(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    pub async fn build(self) -> SyncResult<TodoEngine> {
        self.config.validate()?;
        let remote = self
            .remote
            .ok_or_else(|| SyncError::InvalidConfig("Remote API required".into()))?;
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(StaticAuth::user(self.config.user_id())));
        let config = Arc::new(self.config);

        let initial = match &self.storage {
            Some(storage) => hydrate(storage.as_ref()).await,
            None => TodoState::default(),
        };
        let store = TodoStore::new(initial);

        let coordinator = Coordinator::new(
            store.clone(),
            remote.clone(),
            auth,
            config.retry_policy(),
            config.sync.rollback_on_abandon,
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(coordinator.clone(), remote.clone()));
        let resolver = ConflictResolver::new(coordinator.clone());
        let connection = ConnectionMonitor::new(store.clone());

        let mut tasks = Vec::new();

        let (scheduler, scheduler_handle) = SyncScheduler::new(
            Arc::clone(&orchestrator),
            connection.subscribe_reconnects(),
            SyncTriggers {
                on_reconnect: config.sync.auto_sync_on_reconnect,
                interval: config.sync.sync_interval(),
            },
        );
        tasks.push(tokio::spawn(scheduler.run()));

        let persistence = self.storage.map(|storage| {
            let (worker, handle) = PersistenceWorker::new(
                storage,
                store.subscribe(),
                config.storage.persist_debounce(),
            );
            tasks.push(tokio::spawn(worker.run()));
            handle
        });

        let pinger = self.ping_interval.map(|interval| {
            let (pinger, handle) = ConnectionPinger::new(connection.clone(), remote.clone(), interval);
            tasks.push(tokio::spawn(pinger.run()));
            handle
        });

        info!(
            user_id = %config.user_id(),
            max_retries = config.sync.max_retries,
            persistent = persistence.is_some(),
            pinging = pinger.is_some(),
            "Todo engine started"
        );

        Ok(TodoEngine {
            config,
            store,
            coordinator,
            orchestrator,
            resolver,
            connection,
            scheduler: scheduler_handle,
            persistence,
            pinger,
            tasks,
        })
    }
}
