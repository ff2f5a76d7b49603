//! # Sync Orchestrator
//!
//! Runs reconciliation passes against the remote store.
//!
//! ## Sync Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Pass Steps                                │
//! │                                                                         │
//! │  0. Guard       one pass at a time; offline or held → Err(Offline)     │
//! │  1. SYNC_START                                                         │
//! │  2. Replay      every queued operation, queue order, one attempt each  │
//! │                 (per-id lanes; todos with a failed or in-flight        │
//! │                  operation are skipped for the rest of the pass)       │
//! │                 update/delete carry their base version, so a remote    │
//! │                 edit since then comes back as a conflict               │
//! │  3. Fetch       remote.list(); todos confirmed while it runs are       │
//! │                 newer than the list and keep their local version       │
//! │  4. Reconcile   one atomic store step:                                 │
//! │                                                                         │
//! │     local ∩ remote, in conflict        → keep local (record has both)  │
//! │     confirmed during fetch             → keep local                    │
//! │     local ∩ remote, no pending op      → remote wins                   │
//! │     local ∩ remote, pending op with                                    │
//! │       base_updated_at == remote        → keep local                    │
//! │       base_updated_at != remote        → ADD_CONFLICTED_TODO           │
//! │     remote only (no pending delete)    → add                           │
//! │     local only, pending op             → keep                          │
//! │     local only, nothing pending        → drop (deleted remotely)       │
//! │                                                                         │
//! │  5. Clean pass    → SYNC_SUCCESS, then re-queue operations that were   │
//! │                     skipped or created while the pass ran              │
//! │     Partial pass  → LOAD_TODOS (+ SYNC_ERROR if retries remain)        │
//! │                                                                         │
//! │  cancel() stops the pass between steps with SYNC_ERROR "Sync cancelled"│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::error::{SyncError, SyncResult};
use crate::executor::Attempt;
use crate::remote::RemoteTodoApi;
use todo_core::{ConflictedTodo, OperationKind, Todo, TodoAction, TodoState};

// =============================================================================
// Sync Report
// =============================================================================

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations the remote store acknowledged during replay.
    pub confirmed: usize,
    /// Operations given up on during replay.
    pub abandoned: usize,
    /// Operations that failed and stay queued for the next pass.
    pub awaiting_retry: usize,
    /// Operations not replayed (in flight elsewhere, or behind a failure).
    pub skipped: usize,
    /// Conflicts raised by this pass.
    pub conflicts: usize,
    /// Remote-only todos added locally.
    pub added: usize,
    /// Local todos dropped because the remote store no longer has them.
    pub removed: usize,
}

impl SyncReport {
    /// True if the pass ended with SYNC_SUCCESS.
    pub fn is_clean(&self) -> bool {
        self.awaiting_retry == 0 && self.abandoned == 0
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives sync passes.
pub struct SyncOrchestrator {
    coordinator: Coordinator,
    remote: Arc<dyn RemoteTodoApi>,
    running: Mutex<()>,
    cancelled: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(coordinator: Coordinator, remote: Arc<dyn RemoteTodoApi>) -> Self {
        SyncOrchestrator {
            coordinator,
            remote,
            running: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Asks a running pass to stop at its next step. Returns false if none runs.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        info!("Sync cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    /// Runs one full pass.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadySyncing)?;

        let store = self.coordinator.store();
        if self.coordinator.is_held_offline()
            || !store.read(|s| s.connection_status.is_reachable())
        {
            debug!("Offline, sync pass not started");
            return Err(SyncError::Offline);
        }

        info!(
            pending = store.read(|s| s.pending_operations.len()),
            "Sync pass started"
        );
        store.dispatch(TodoAction::SyncStart);

        let result = self.run_pass().await;
        self.cancelled.store(false, Ordering::SeqCst);

        match result {
            Ok(report) => {
                info!(
                    confirmed = report.confirmed,
                    abandoned = report.abandoned,
                    awaiting_retry = report.awaiting_retry,
                    conflicts = report.conflicts,
                    added = report.added,
                    removed = report.removed,
                    clean = report.is_clean(),
                    "Sync pass finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Sync pass failed");
                store.dispatch(TodoAction::SyncError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn checkpoint(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn run_pass(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let failed = self.replay(&mut report).await?;

        self.checkpoint()?;
        let executor = self.coordinator.executor();
        executor.track_confirmations();
        let listed = self.remote.list().await;
        let fresh = executor.take_confirmations();
        let remote_todos = listed?;
        debug!(count = remote_todos.len(), fresh = fresh.len(), "Fetched remote todos");

        self.checkpoint()?;
        let now = Utc::now();
        let settled = Settled {
            failed: &failed,
            fresh: &fresh,
        };
        self.coordinator.store().transact(|state| {
            reconcile_actions(state, &remote_todos, &settled, now, &mut report)
        });

        executor.store().read(|s| executor.prune_reverts(s));

        Ok(report)
    }

    /// Replays the queue in order. Returns the todo ids whose operations
    /// failed and stay queued.
    async fn replay(&self, report: &mut SyncReport) -> SyncResult<HashSet<String>> {
        let executor = self.coordinator.executor();
        let queue: Vec<(String, String)> = executor.store().read(|s| {
            s.pending_operations
                .iter()
                .map(|op| (op.id.clone(), op.todo_id.clone()))
                .collect()
        });

        let mut held: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();

        for (operation_id, todo_id) in queue {
            self.checkpoint()?;

            // Later operations for a todo must not overtake an earlier one
            if held.contains(&todo_id) || executor.is_todo_claimed(&todo_id) {
                debug!(operation_id = %operation_id, todo_id = %todo_id, "Skipping replay");
                report.skipped += 1;
                held.insert(todo_id);
                continue;
            }

            let lane = executor.clone();
            let id = operation_id.clone();
            let attempt = self
                .coordinator
                .sequencer()
                .run(&todo_id, async move { lane.attempt(&id).await })
                .await?;

            match attempt {
                Attempt::Confirmed(_) => report.confirmed += 1,
                Attempt::Missing => {}
                Attempt::Abandoned(_) => report.abandoned += 1,
                Attempt::Conflicted => {
                    report.conflicts += 1;
                    held.insert(todo_id);
                }
                Attempt::Blocked => {
                    report.skipped += 1;
                    held.insert(todo_id);
                }
                Attempt::Failed { .. } => {
                    failed.insert(todo_id.clone());
                    held.insert(todo_id);
                }
            }
        }

        Ok(failed)
    }
}

/// What the pass learned about individual todos before reconciling.
struct Settled<'a> {
    /// Todos whose operations failed and stay queued.
    failed: &'a HashSet<String>,
    /// Todos confirmed while the remote list was being fetched.
    fresh: &'a HashSet<String>,
}

/// Builds the actions that fold `remote` into `state`.
fn reconcile_actions(
    state: &TodoState,
    remote: &[Todo],
    settled: &Settled<'_>,
    now: DateTime<Utc>,
    report: &mut SyncReport,
) -> Vec<TodoAction> {
    let remote_by_id: HashMap<&str, &Todo> = remote.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut merged = Vec::with_capacity(remote.len().max(state.todos.len()));
    let mut conflicts = Vec::new();

    for local in &state.todos {
        let Some(theirs) = remote_by_id.get(local.id.as_str()) else {
            if state.has_pending(&local.id)
                || state.is_conflicted(&local.id)
                || settled.fresh.contains(&local.id)
            {
                merged.push(local.clone());
            } else {
                debug!(todo_id = %local.id, "Dropping todo deleted remotely");
                report.removed += 1;
            }
            continue;
        };

        // The list predates a confirmation that landed while it was fetched
        if state.is_conflicted(&local.id) || settled.fresh.contains(&local.id) {
            merged.push(local.clone());
            continue;
        }

        match state.pending_for(&local.id).next() {
            None => merged.push((*theirs).clone()),
            Some(op) => match op.base_updated_at {
                Some(base) if base != theirs.updated_at => {
                    warn!(
                        todo_id = %local.id,
                        base = %base,
                        remote_updated_at = %theirs.updated_at,
                        "Remote changed under a pending edit, raising conflict"
                    );
                    conflicts.push(ConflictedTodo {
                        local: local.clone(),
                        remote: (*theirs).clone(),
                        detected_at: now,
                    });
                    merged.push(local.clone());
                }
                _ => merged.push(local.clone()),
            },
        }
    }

    let local_ids: HashSet<&str> = state.todos.iter().map(|t| t.id.as_str()).collect();
    for theirs in remote {
        let id = theirs.id.as_str();
        let deleting = state
            .pending_for(id)
            .any(|op| op.kind == OperationKind::Delete);
        // A fresh id missing locally was deleted while the list was fetched
        if local_ids.contains(id)
            || deleting
            || state.is_conflicted(id)
            || settled.fresh.contains(id)
        {
            continue;
        }
        merged.push(theirs.clone());
        report.added += 1;
    }

    let conflicted: HashSet<&str> = conflicts.iter().map(|c| c.todo_id()).collect();
    report.conflicts += conflicts.len();
    report.awaiting_retry = settled
        .failed
        .iter()
        .filter(|id| !conflicted.contains(id.as_str()))
        .map(|id| state.pending_for(id).count())
        .sum();

    let mut actions: Vec<TodoAction> = conflicts
        .iter()
        .cloned()
        .map(TodoAction::AddConflictedTodo)
        .collect();

    if report.is_clean() {
        actions.push(TodoAction::SyncSuccess {
            last_sync_at: now,
            synced_todos: Some(merged),
        });
        // SYNC_SUCCESS empties the queue; put back what this pass did not settle
        actions.extend(
            state
                .pending_operations
                .iter()
                .cloned()
                .map(TodoAction::AddPendingOperation),
        );
    } else {
        actions.push(TodoAction::LoadTodos(merged));
        if report.awaiting_retry > 0 {
            actions.push(TodoAction::SyncError {
                message: format!(
                    "Sync incomplete: {} operation(s) awaiting retry",
                    report.awaiting_retry
                ),
            });
        }
    }

    actions
}

// =============================================================================
// Sync Scheduler
// =============================================================================

/// When the scheduler starts passes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTriggers {
    /// Sync when the connection goes from offline to online.
    pub on_reconnect: bool,
    /// Sync on a fixed interval.
    pub interval: Option<Duration>,
}

/// Starts sync passes on reconnect and on an interval.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    /// Reconnect counter from the connection monitor.
    reconnect_rx: watch::Receiver<u64>,
    triggers: SyncTriggers,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the scheduler.
#[derive(Clone)]
pub struct SyncSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncSchedulerHandle {
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Scheduler shutdown channel closed".into()))
    }
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        reconnect_rx: watch::Receiver<u64>,
        triggers: SyncTriggers,
    ) -> (Self, SyncSchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let scheduler = SyncScheduler {
            orchestrator,
            reconnect_rx,
            triggers,
            shutdown_rx,
        };
        (scheduler, SyncSchedulerHandle { shutdown_tx })
    }

    /// Runs the scheduler loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(
            on_reconnect = self.triggers.on_reconnect,
            interval = ?self.triggers.interval,
            "Sync scheduler starting"
        );

        self.reconnect_rx.borrow_and_update();
        let mut interval = self.triggers.interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            let tick = async {
                match interval.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = self.reconnect_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.reconnect_rx.borrow_and_update();
                    if self.triggers.on_reconnect {
                        self.run_pass("reconnect").await;
                    }
                }

                _ = tick => self.run_pass("interval").await,

                _ = self.shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn run_pass(&self, trigger: &'static str) {
        if self.orchestrator.coordinator.is_held_offline() {
            debug!(trigger, "Held offline, scheduled sync skipped");
            return;
        }
        debug!(trigger, "Scheduled sync");
        match self.orchestrator.sync().await {
            Ok(_) => {}
            Err(SyncError::AlreadySyncing) | Err(SyncError::Offline) => {
                debug!(trigger, "Scheduled sync skipped");
            }
            Err(e) => warn!(trigger, error = %e, "Scheduled sync failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::connection::ConnectionMonitor;
    use crate::coordinator::MutationOutcome;
    use crate::error::RemoteError;
    use crate::remote::InMemoryTodoApi;
    use crate::retry::RetryPolicy;
    use crate::store::TodoStore;
    use todo_core::{ConnectionStatus, NewTodo, PendingOperation, SyncStatus, TodoPatch};

    struct Harness {
        store: TodoStore,
        remote: Arc<InMemoryTodoApi>,
        coordinator: Coordinator,
        orchestrator: Arc<SyncOrchestrator>,
    }

    fn harness(remote: InMemoryTodoApi, max_retries: u32) -> Harness {
        let store = TodoStore::default();
        let remote = Arc::new(remote);
        let coordinator = Coordinator::new(
            store.clone(),
            remote.clone(),
            Arc::new(StaticAuth::guest()),
            RetryPolicy::immediate(max_retries),
            true,
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(coordinator.clone(), remote.clone()));
        Harness {
            store,
            remote,
            coordinator,
            orchestrator,
        }
    }

    fn todo(id: &str, title: &str) -> Todo {
        NewTodo::new(title).into_todo(id.into(), "guest".into(), Utc::now())
    }

    fn go_offline(h: &Harness) {
        h.store
            .dispatch(TodoAction::SetConnectionStatus(ConnectionStatus::Offline));
    }

    fn go_online(h: &Harness) {
        h.store
            .dispatch(TodoAction::SetConnectionStatus(ConnectionStatus::Online));
    }

    #[tokio::test]
    async fn test_pulls_remote_only_todos() {
        let h = harness(
            InMemoryTodoApi::with_todos(vec![todo("a", "From phone"), todo("b", "From laptop")]),
            3,
        );

        let report = h.orchestrator.sync().await.unwrap();
        assert_eq!(report.added, 2);
        assert!(report.is_clean());

        let state = h.store.state();
        assert_eq!(state.todos.len(), 2);
        assert_eq!(state.sync_status, SyncStatus::Success);
        assert!(state.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_replays_offline_queue_in_order() {
        let h = harness(InMemoryTodoApi::new(), 3);
        go_offline(&h);

        let id = h
            .coordinator
            .add_todo(NewTodo::new("Draft"))
            .unwrap()
            .todo_id()
            .to_string();
        h.coordinator.toggle_todo(&id).unwrap();
        h.coordinator
            .update_todo(&id, TodoPatch::title("Final"))
            .unwrap();
        assert_eq!(h.store.state().pending_operations.len(), 3);

        go_online(&h);
        let report = h.orchestrator.sync().await.unwrap();
        assert_eq!(report.confirmed, 3);

        let state = h.store.state();
        assert!(state.pending_operations.is_empty());
        assert!(state.conflicted_todos.is_empty());
        let stored = h.remote.get(&id).await.unwrap();
        assert_eq!(stored.title, "Final");
        assert!(stored.completed);
        assert_eq!(state.todos, vec![stored]);
    }

    #[tokio::test]
    async fn scenario_e_stale_replay_raises_conflict_instead_of_overwriting() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.put(todo("a", "Write report")).await;
        h.orchestrator.sync().await.unwrap();

        go_offline(&h);
        h.coordinator
            .update_todo("a", TodoPatch::title("Local title"))
            .unwrap();
        let theirs = h
            .remote
            .edit("a", &TodoPatch::title("Remote title"))
            .await
            .unwrap();

        // Replay reaches the remote store, which refuses the stale write
        go_online(&h);
        let report = h.orchestrator.sync().await.unwrap();
        assert_eq!(report.confirmed, 0);
        assert_eq!(report.conflicts, 1);

        assert_eq!(h.remote.get("a").await.unwrap(), theirs);
        let state = h.store.state();
        let conflict = state.conflict("a").unwrap();
        assert_eq!(conflict.local.title, "Local title");
        assert_eq!(conflict.remote, theirs);
        assert_eq!(state.find("a").unwrap().title, "Local title");
        assert!(state.pending_operations.is_empty());
    }

    #[tokio::test]
    async fn test_stale_delete_raises_conflict() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.put(todo("a", "Write report")).await;
        h.orchestrator.sync().await.unwrap();

        go_offline(&h);
        h.coordinator.delete_todo("a").unwrap();
        let theirs = h
            .remote
            .edit("a", &TodoPatch::completed(true))
            .await
            .unwrap();

        go_online(&h);
        let report = h.orchestrator.sync().await.unwrap();
        assert_eq!(report.conflicts, 1);

        assert_eq!(h.remote.get("a").await.unwrap(), theirs);
        let state = h.store.state();
        assert_eq!(state.conflict("a").unwrap().remote, theirs);
        assert!(state.pending_operations.is_empty());
    }

    #[tokio::test]
    async fn test_failed_replay_still_detects_remote_divergence() {
        let original = todo("a", "Write report");
        let h = harness(InMemoryTodoApi::new(), 3);
        let stored = h.remote.put(original).await;
        h.orchestrator.sync().await.unwrap();
        assert_eq!(h.store.state().todos, vec![stored.clone()]);

        // Local edit made offline, based on the stored version
        go_offline(&h);
        h.coordinator
            .update_todo("a", TodoPatch::title("Write the report"))
            .unwrap();

        // Meanwhile another device edits the same todo
        let theirs = h
            .remote
            .edit("a", &TodoPatch::title("Write report v2"))
            .await
            .unwrap();

        // The replay fails transiently, so reconciliation has to catch it
        go_online(&h);
        h.remote.inject(RemoteError::Timeout).await;
        let report = h.orchestrator.sync().await.unwrap();
        assert_eq!(report.conflicts, 1);

        let state = h.store.state();
        let conflict = state.conflict("a").unwrap();
        assert_eq!(conflict.local.title, "Write the report");
        assert_eq!(conflict.remote, theirs);
        assert_eq!(
            state.find("a").unwrap().title,
            "Write the report",
            "local edit is not overwritten"
        );
    }

    #[tokio::test]
    async fn test_matching_base_keeps_local_edit() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.put(todo("a", "Write report")).await;
        h.orchestrator.sync().await.unwrap();

        go_offline(&h);
        h.coordinator.toggle_todo("a").unwrap();
        go_online(&h);

        // Replay fails; the remote version is still the one the edit was based on
        h.remote.inject(RemoteError::Timeout).await;
        let report = h.orchestrator.sync().await.unwrap();

        assert_eq!(report.conflicts, 0);
        assert_eq!(report.awaiting_retry, 1);
        let state = h.store.state();
        assert!(state.find("a").unwrap().completed);
        assert_eq!(state.pending_operations.len(), 1);
        assert_eq!(state.sync_status, SyncStatus::Error);
        assert!(state.sync_errors[0].contains("awaiting retry"));
    }

    #[tokio::test]
    async fn test_remote_deletions_drop_unqueued_todos() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.put(todo("a", "Gone soon")).await;
        h.remote.put(todo("b", "Stays")).await;
        h.orchestrator.sync().await.unwrap();

        h.remote.remove("a").await;
        let report = h.orchestrator.sync().await.unwrap();

        assert_eq!(report.removed, 1);
        let ids: Vec<_> = h.store.state().todos.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_delete_is_not_resurrected() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.put(todo("a", "Delete me")).await;
        h.orchestrator.sync().await.unwrap();

        go_offline(&h);
        h.coordinator.delete_todo("a").unwrap();
        go_online(&h);

        h.remote.inject(RemoteError::Timeout).await;
        h.orchestrator.sync().await.unwrap();

        let state = h.store.state();
        assert!(state.todos.is_empty());
        assert_eq!(state.pending_operations.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_replay_is_abandoned_once() {
        let h = harness(InMemoryTodoApi::new(), 0);
        go_offline(&h);
        h.coordinator.add_todo(NewTodo::new("Doomed")).unwrap();
        go_online(&h);

        h.remote.fail_next(1).await;
        let report = h.orchestrator.sync().await.unwrap();

        assert_eq!(report.abandoned, 1);
        assert!(!report.is_clean());
        let state = h.store.state();
        assert!(state.pending_operations.is_empty());
        assert!(state.todos.is_empty());
        assert_eq!(state.sync_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_operations_created_during_pass_survive_success() {
        let h = harness(InMemoryTodoApi::new(), 3);
        // Queued while offline but never replayed: claimed by an in-flight task
        let late = todo("late", "Added mid-sync");
        let op = PendingOperation::create(&late, Utc::now());
        h.store.dispatch(TodoAction::OptimisticAddTodo(late));
        h.store.dispatch(TodoAction::AddPendingOperation(op.clone()));
        let claim = h.coordinator.executor().claim(&op);

        let report = h.orchestrator.sync().await.unwrap();
        drop(claim);

        assert_eq!(report.skipped, 1);
        assert!(report.is_clean());
        let state = h.store.state();
        assert_eq!(state.sync_status, SyncStatus::Success);
        assert_eq!(state.pending_operations, vec![op]);
        assert!(state.contains("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_todo_confirmed_during_fetch_is_kept() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.set_latency(Duration::from_millis(100)).await;

        let orchestrator = Arc::clone(&h.orchestrator);
        let pass = tokio::spawn(async move { orchestrator.sync().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The list is on its way back without this todo
        h.remote.set_latency(Duration::ZERO).await;
        let ticket = h.coordinator.add_todo(NewTodo::new("Added mid-fetch")).unwrap();
        let id = ticket.todo_id().to_string();
        assert!(ticket.outcome().await.is_confirmed());

        let report = pass.await.unwrap().unwrap();
        assert_eq!(report.removed, 0);
        let state = h.store.state();
        assert!(state.contains(&id));
        assert!(state.pending_operations.is_empty());
        assert_eq!(state.sync_status, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_held_offline_refuses_sync() {
        let h = harness(InMemoryTodoApi::with_todos(vec![todo("a", "Remote")]), 3);
        go_online(&h);
        h.coordinator.set_held_offline(true);

        assert!(matches!(
            h.orchestrator.sync().await,
            Err(SyncError::Offline)
        ));
        assert!(h.remote.calls().await.is_empty());

        h.coordinator.set_held_offline(false);
        assert_eq!(h.orchestrator.sync().await.unwrap().added, 1);
    }

    #[tokio::test]
    async fn test_list_failure_reports_error() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.fail_next(1).await;

        let err = h.orchestrator.sync().await.unwrap_err();
        assert!(err.is_retryable());

        let state = h.store.state();
        assert_eq!(state.sync_status, SyncStatus::Error);
        assert_eq!(state.sync_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_sync_is_refused() {
        let h = harness(InMemoryTodoApi::new(), 3);
        go_offline(&h);

        assert!(matches!(
            h.orchestrator.sync().await,
            Err(SyncError::Offline)
        ));
        assert!(h.remote.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_steps() {
        let h = harness(InMemoryTodoApi::new(), 3);
        h.remote.set_latency(Duration::from_millis(100)).await;
        go_offline(&h);
        h.coordinator.add_todo(NewTodo::new("One")).unwrap();
        h.coordinator.add_todo(NewTodo::new("Two")).unwrap();
        go_online(&h);

        let orchestrator = Arc::clone(&h.orchestrator);
        let pass = tokio::spawn(async move { orchestrator.sync().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.orchestrator.cancel());

        assert!(matches!(pass.await.unwrap(), Err(SyncError::Cancelled)));
        let state = h.store.state();
        assert_eq!(state.sync_errors, vec!["Sync cancelled".to_string()]);
        // The call already in flight completed; the second was never issued
        assert_eq!(state.pending_operations.len(), 1);
        assert!(!h.orchestrator.cancel(), "nothing left to cancel");
    }

    #[tokio::test]
    async fn test_one_pass_at_a_time() {
        let h = harness(InMemoryTodoApi::new(), 3);
        let _guard = h.orchestrator.running.try_lock().unwrap();
        assert!(matches!(
            h.orchestrator.sync().await,
            Err(SyncError::AlreadySyncing)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_syncs_on_reconnect_only() {
        let h = harness(InMemoryTodoApi::new(), 3);
        let monitor = ConnectionMonitor::new(h.store.clone());

        let (scheduler, handle) = SyncScheduler::new(
            Arc::clone(&h.orchestrator),
            monitor.subscribe_reconnects(),
            SyncTriggers {
                on_reconnect: true,
                interval: None,
            },
        );
        let task = tokio::spawn(scheduler.run());

        // Unknown -> Online is the first observation, not a reconnect
        monitor.report(ConnectionStatus::Online);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.remote.calls().await.is_empty());

        monitor.report(ConnectionStatus::Offline);
        let ticket = h.coordinator.add_todo(NewTodo::new("Queued")).unwrap();
        assert_eq!(ticket.outcome().await, MutationOutcome::Queued);

        monitor.report(ConnectionStatus::Online);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = h.store.state();
        assert!(state.pending_operations.is_empty());
        assert_eq!(state.sync_status, SyncStatus::Success);
        assert_eq!(h.remote.snapshot().await.len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_skips_triggers_while_held_offline() {
        let h = harness(InMemoryTodoApi::new(), 3);
        let monitor = ConnectionMonitor::new(h.store.clone());
        let (scheduler, handle) = SyncScheduler::new(
            Arc::clone(&h.orchestrator),
            monitor.subscribe_reconnects(),
            SyncTriggers {
                on_reconnect: true,
                interval: Some(Duration::from_secs(60)),
            },
        );
        let task = tokio::spawn(scheduler.run());

        h.coordinator.set_held_offline(true);
        monitor.report(ConnectionStatus::Offline);
        h.coordinator.add_todo(NewTodo::new("Kept local")).unwrap();
        monitor.report(ConnectionStatus::Online);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(h.remote.calls().await.is_empty());
        assert_eq!(h.store.state().pending_operations.len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_interval() {
        let h = harness(
            InMemoryTodoApi::with_todos(vec![todo("a", "Remote")]),
            3,
        );
        let monitor = ConnectionMonitor::new(h.store.clone());
        let (scheduler, handle) = SyncScheduler::new(
            Arc::clone(&h.orchestrator),
            monitor.subscribe_reconnects(),
            SyncTriggers {
                on_reconnect: false,
                interval: Some(Duration::from_secs(60)),
            },
        );
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.store.state().todos.len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
