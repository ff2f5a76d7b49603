//! # Operation Executor
//!
//! Delivers one queued operation to the remote store and folds the answer
//! back into state. Shared by the coordinator (immediate delivery with
//! retries) and the orchestrator (replay during a sync pass).
//!
//! ## One Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  op still queued? ── no ──► Missing                                    │
//! │        │ yes                                                            │
//! │  todo in conflict? ── yes ─► Blocked (stays queued)                    │
//! │        │ no                                                             │
//! │  remote call     (update/delete carry base_updated_at; a remote      │
//! │                   version that moved since then answers Conflict)      │
//! │   ├─ Ok(server)           ──► CONFIRM_OPERATION            Confirmed   │
//! │   ├─ Err(Conflict)        ──► ADD_CONFLICTED_TODO +                    │
//! │   │                           REMOVE_PENDING_OPERATION     Conflicted  │
//! │   └─ Err(other)           ──► UPDATE_PENDING_OPERATION (retry + 1)     │
//! │        ├─ retryable and retry_count <= max   ──► Failed (try later)    │
//! │        └─ otherwise ──► ROLLBACK_OPTIMISTIC_OPERATION + SYNC_ERROR     │
//! │                                                            Abandoned   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SyncError};
use crate::remote::RemoteTodoApi;
use crate::retry::RetryPolicy;
use crate::store::TodoStore;
use todo_core::{ConflictedTodo, OperationKind, PendingOperation, Todo, TodoAction, TodoState};

// =============================================================================
// Revert Information
// =============================================================================

/// How to undo one optimistic mutation, captured when it was applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Revert {
    /// Undo a create.
    Remove { todo_id: String },
    /// Undo an update or delete: put the prior version back.
    Restore { todo: Todo, index: usize },
}

impl Revert {
    /// `todos` with this mutation undone and everything else untouched.
    fn restored(&self, todos: &[Todo]) -> Vec<Todo> {
        match self {
            Revert::Remove { todo_id } => {
                todos.iter().filter(|t| &t.id != todo_id).cloned().collect()
            }
            Revert::Restore { todo, index } => {
                let mut restored = todos.to_vec();
                match restored.iter().position(|t| t.id == todo.id) {
                    Some(current) => restored[current] = todo.clone(),
                    None => restored.insert((*index).min(restored.len()), todo.clone()),
                }
                restored
            }
        }
    }

    /// The pre-mutation version, if there was one.
    fn prior(&self) -> Option<&Todo> {
        match self {
            Revert::Remove { .. } => None,
            Revert::Restore { todo, .. } => Some(todo),
        }
    }
}

// =============================================================================
// Attempt Result
// =============================================================================

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Attempt {
    /// The remote store acknowledged the operation.
    Confirmed(Option<Todo>),
    /// The remote store reported a divergent version; the todo is parked.
    Conflicted,
    /// The operation left the queue before or during the attempt.
    Missing,
    /// The todo is under conflict; the operation stays queued.
    Blocked,
    /// The attempt failed and may be retried.
    Failed { retry_count: u32, error: RemoteError },
    /// The attempt failed for the last time; the operation is gone.
    Abandoned(String),
}

// =============================================================================
// Executor
// =============================================================================

/// Delivers queued operations.
#[derive(Clone)]
pub(crate) struct OperationExecutor {
    store: TodoStore,
    remote: Arc<dyn RemoteTodoApi>,
    policy: RetryPolicy,
    rollback_on_abandon: bool,

    /// Operation id -> todo id, for operations a coordinator task owns.
    claims: Arc<Mutex<HashMap<String, String>>>,

    /// Operation id -> how to undo it. Only known for this session's intents.
    reverts: Arc<Mutex<HashMap<String, Revert>>>,

    /// Set while the user works offline; nothing is sent until cleared.
    held_offline: Arc<AtomicBool>,

    /// Todo ids confirmed since `track_confirmations`, while tracking is on.
    confirmed: Arc<Mutex<Option<HashSet<String>>>>,
}

impl OperationExecutor {
    pub(crate) fn new(
        store: TodoStore,
        remote: Arc<dyn RemoteTodoApi>,
        policy: RetryPolicy,
        rollback_on_abandon: bool,
    ) -> Self {
        OperationExecutor {
            store,
            remote,
            policy,
            rollback_on_abandon,
            claims: Arc::new(Mutex::new(HashMap::new())),
            reverts: Arc::new(Mutex::new(HashMap::new())),
            held_offline: Arc::new(AtomicBool::new(false)),
            confirmed: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn store(&self) -> &TodoStore {
        &self.store
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn set_held_offline(&self, held: bool) {
        self.held_offline.store(held, Ordering::SeqCst);
    }

    pub(crate) fn is_held_offline(&self) -> bool {
        self.held_offline.load(Ordering::SeqCst)
    }

    /// True if remote calls may be made right now.
    pub(crate) fn can_deliver(&self) -> bool {
        !self.is_held_offline() && self.store.read(|s| s.connection_status.is_reachable())
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    pub(crate) fn remember_revert(&self, operation_id: &str, revert: Revert) {
        lock(&self.reverts).insert(operation_id.to_string(), revert);
    }

    fn take_revert(&self, operation_id: &str) -> Option<Revert> {
        lock(&self.reverts).remove(operation_id)
    }

    /// Forgets reverts for operations no longer in the queue.
    pub(crate) fn prune_reverts(&self, state: &TodoState) {
        lock(&self.reverts).retain(|id, _| state.pending_operation(id).is_some());
    }

    /// Marks an operation as owned by a coordinator task until the guard drops.
    pub(crate) fn claim(&self, operation: &PendingOperation) -> ClaimGuard {
        lock(&self.claims).insert(operation.id.clone(), operation.todo_id.clone());
        ClaimGuard {
            operation_id: operation.id.clone(),
            claims: Arc::clone(&self.claims),
        }
    }

    /// Starts recording which todos get confirmed, dropping any earlier record.
    pub(crate) fn track_confirmations(&self) {
        *lock(&self.confirmed) = Some(HashSet::new());
    }

    /// Stops recording and returns the todos confirmed meanwhile.
    pub(crate) fn take_confirmations(&self) -> HashSet<String> {
        lock(&self.confirmed).take().unwrap_or_default()
    }

    /// True if a coordinator task currently owns work for `todo_id`.
    pub(crate) fn is_todo_claimed(&self, todo_id: &str) -> bool {
        lock(&self.claims).values().any(|id| id == todo_id)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Makes one delivery attempt for the queued operation `operation_id`.
    pub(crate) async fn attempt(&self, operation_id: &str) -> Attempt {
        let Some(op) = self.store.read(|s| s.pending_operation(operation_id).cloned()) else {
            debug!(operation_id, "Operation no longer queued");
            return Attempt::Missing;
        };

        if self.store.read(|s| s.is_conflicted(&op.todo_id)) {
            debug!(operation_id, todo_id = %op.todo_id, "Todo in conflict, holding operation");
            return Attempt::Blocked;
        }

        match self.send(&op).await {
            Ok(server_todo) => {
                info!(
                    operation_id,
                    kind = %op.kind,
                    todo_id = %op.todo_id,
                    "Operation confirmed"
                );
                self.store.dispatch(TodoAction::ConfirmOperation {
                    operation_id: op.id.clone(),
                    server_todo: server_todo.clone(),
                });
                self.take_revert(&op.id);
                if let Some(confirmed) = lock(&self.confirmed).as_mut() {
                    confirmed.insert(op.todo_id.clone());
                }
                Attempt::Confirmed(server_todo)
            }
            Err(RemoteError::Conflict { current }) => {
                self.raise_conflict(&op, *current);
                Attempt::Conflicted
            }
            Err(error) => self.record_failure(op, error),
        }
    }

    async fn send(&self, op: &PendingOperation) -> Result<Option<Todo>, RemoteError> {
        match op.kind {
            OperationKind::Create => {
                let todo = op.created_todo().ok_or_else(|| missing_payload(op))?;
                self.remote.create(todo).await.map(Some)
            }
            OperationKind::Update => {
                let patch = op.patch().ok_or_else(|| missing_payload(op))?;
                self.remote
                    .update(&op.todo_id, patch, op.base_updated_at)
                    .await
                    .map(Some)
            }
            OperationKind::Delete => match self.remote.delete(&op.todo_id, op.base_updated_at).await {
                // Already gone is as good as deleted
                Ok(()) | Err(RemoteError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    fn raise_conflict(&self, op: &PendingOperation, remote: Todo) {
        let revert = self.take_revert(&op.id);
        warn!(
            operation_id = %op.id,
            todo_id = %op.todo_id,
            remote_updated_at = %remote.updated_at,
            "Remote version diverged, parking todo as conflicted"
        );

        self.store.transact(|state| {
            let local = state
                .find(&op.todo_id)
                .cloned()
                .or_else(|| op.created_todo().cloned())
                .or_else(|| revert.as_ref().and_then(Revert::prior).cloned())
                .unwrap_or_else(|| remote.clone());

            vec![
                TodoAction::AddConflictedTodo(ConflictedTodo {
                    local,
                    remote,
                    detected_at: Utc::now(),
                }),
                TodoAction::RemovePendingOperation {
                    operation_id: op.id.clone(),
                },
            ]
        });
    }

    fn record_failure(&self, mut op: PendingOperation, error: RemoteError) -> Attempt {
        if self.store.read(|s| s.pending_operation(&op.id).is_none()) {
            debug!(operation_id = %op.id, "Operation left the queue while in flight");
            return Attempt::Missing;
        }

        op.retry_count += 1;
        op.last_error = Some(error.to_string());
        self.store
            .dispatch(TodoAction::UpdatePendingOperation(op.clone()));

        if error.is_retryable() && !self.policy.is_exhausted(op.retry_count) {
            warn!(
                operation_id = %op.id,
                kind = %op.kind,
                retry_count = op.retry_count,
                max_retries = self.policy.max_retries,
                error = %error,
                "Remote call failed, will retry"
            );
            return Attempt::Failed {
                retry_count: op.retry_count,
                error,
            };
        }

        Attempt::Abandoned(self.abandon(&op, &error))
    }

    /// Drops the operation, rolls back its optimistic effect and records one sync error.
    fn abandon(&self, op: &PendingOperation, error: &RemoteError) -> String {
        let revert = self.take_revert(&op.id);
        let message = if error.is_retryable() {
            SyncError::MaxRetriesExceeded {
                operation_id: op.id.clone(),
                attempts: op.retry_count,
                last_error: error.to_string(),
            }
            .to_string()
        } else {
            format!("Failed to {} todo {}: {}", op.kind, op.todo_id, error)
        };

        warn!(
            operation_id = %op.id,
            kind = %op.kind,
            todo_id = %op.todo_id,
            retry_count = op.retry_count,
            error = %error,
            "Abandoning operation"
        );

        let rollback_on_abandon = self.rollback_on_abandon;
        self.store.transact(|state| {
            // Later edits to the same todo would be undone too; skip the snapshot then
            let sole_operation = state
                .pending_for(&op.todo_id)
                .all(|other| other.id == op.id);
            let previous_state = revert
                .filter(|_| rollback_on_abandon && sole_operation)
                .map(|r| r.restored(&state.todos));

            vec![
                TodoAction::RollbackOptimisticOperation {
                    operation_id: op.id.clone(),
                    previous_state,
                },
                TodoAction::SyncError {
                    message: message.clone(),
                },
            ]
        });

        message
    }
}

/// Releases an operation claim on drop.
pub(crate) struct ClaimGuard {
    operation_id: String,
    claims: Arc<Mutex<HashMap<String, String>>>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        lock(&self.claims).remove(&self.operation_id);
    }
}

fn missing_payload(op: &PendingOperation) -> RemoteError {
    RemoteError::rejected(422, format!("{} operation {} has no payload", op.kind, op.id))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
