//! # Optimistic Update Coordinator
//!
//! Turns user intents into optimistic state changes plus queued operations,
//! then delivers those operations to the remote store in the background.
//!
//! ## Intent Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Intent Pipeline                                │
//! │                                                                         │
//! │  add_todo / update_todo / toggle_todo / delete_todo                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  1. Permission  (AuthContext)        ─┐                                │
//! │  2. Validation  (todo_core rules)     ├─ Err returned, state untouched │
//! │  3. Target      (exists, no conflict)─┘                                │
//! │        │                                                                │
//! │        ▼  one atomic store step                                         │
//! │  4. OPTIMISTIC_*_TODO  +  ADD_PENDING_OPERATION                        │
//! │        │                                                                │
//! │        ▼  returns MutationTicket immediately                            │
//! │  5. OperationSequencer (FIFO per todo id)                              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  6. attempt ─► Confirmed | Conflicted | Abandoned                      │
//! │        │  Failed: sleep per RetryPolicy, attempt again                 │
//! │        │  Offline or held offline: stop, the next sync pass replays it │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::{SyncError, SyncResult};
use crate::executor::{Attempt, OperationExecutor, Revert};
use crate::remote::RemoteTodoApi;
use crate::retry::RetryPolicy;
use crate::sequencer::OperationSequencer;
use crate::store::TodoStore;
use todo_core::validation::{validate_new_todo, validate_patch};
use todo_core::{
    next_timestamp, CoreError, NewTodo, PendingOperation, Todo, TodoAction, TodoPatch,
    TodoPermission, TodoState,
};

// =============================================================================
// Mutation Ticket
// =============================================================================

/// Final state of an accepted intent.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The remote store acknowledged it. Carries the server version, if any.
    Confirmed(Option<Todo>),
    /// Not delivered yet (offline or waiting on a conflict); stays queued.
    Queued,
    /// Given up on; rolled back and reported in `sync_errors`.
    Abandoned(String),
    /// The remote store reported a divergent version; see `conflicted_todos`.
    Conflicted,
    /// The operation left the queue some other way (sync pass, resolution).
    Superseded,
}

impl MutationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed(_))
    }
}

/// Handle to an accepted intent.
///
/// The optimistic change is already visible when the ticket is returned.
/// Awaiting [`outcome`](Self::outcome) is optional.
#[derive(Debug)]
pub struct MutationTicket {
    operation_id: String,
    todo_id: String,
    rx: oneshot::Receiver<MutationOutcome>,
}

impl MutationTicket {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn todo_id(&self) -> &str {
        &self.todo_id
    }

    /// Waits for delivery to finish.
    pub async fn outcome(self) -> MutationOutcome {
        // A dropped delivery task leaves the operation in the queue
        self.rx.await.unwrap_or(MutationOutcome::Queued)
    }
}

// =============================================================================
// Coordinator
// =============================================================================

struct Planned {
    operation: PendingOperation,
    optimistic: TodoAction,
    revert: Revert,
}

/// Applies intents optimistically and delivers them.
#[derive(Clone)]
pub struct Coordinator {
    executor: OperationExecutor,
    auth: Arc<dyn AuthContext>,
    sequencer: OperationSequencer,
}

impl Coordinator {
    pub fn new(
        store: TodoStore,
        remote: Arc<dyn RemoteTodoApi>,
        auth: Arc<dyn AuthContext>,
        policy: RetryPolicy,
        rollback_on_abandon: bool,
    ) -> Self {
        Coordinator {
            executor: OperationExecutor::new(store, remote, policy, rollback_on_abandon),
            auth,
            sequencer: OperationSequencer::new(),
        }
    }

    /// Holds every remote call until released. Intents are still applied
    /// and queued.
    pub fn set_held_offline(&self, held: bool) {
        self.executor.set_held_offline(held);
    }

    pub fn is_held_offline(&self) -> bool {
        self.executor.is_held_offline()
    }

    pub(crate) fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub(crate) fn sequencer(&self) -> &OperationSequencer {
        &self.sequencer
    }

    pub fn store(&self) -> &TodoStore {
        self.executor.store()
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Creates a todo owned by the acting user.
    pub fn add_todo(&self, input: NewTodo) -> SyncResult<MutationTicket> {
        self.authorize(TodoPermission::Create)?;
        validate_new_todo(&input).map_err(CoreError::from)?;

        let now = Utc::now();
        let todo = input.into_todo(Uuid::new_v4().to_string(), self.auth.user_id(), now);

        self.apply(|_| {
            Ok(Planned {
                operation: PendingOperation::create(&todo, now),
                revert: Revert::Remove {
                    todo_id: todo.id.clone(),
                },
                optimistic: TodoAction::OptimisticAddTodo(todo.clone()),
            })
        })
    }

    /// Applies a partial update.
    pub fn update_todo(&self, id: &str, patch: TodoPatch) -> SyncResult<MutationTicket> {
        self.authorize(TodoPermission::Update)?;
        validate_patch(&patch).map_err(CoreError::from)?;

        self.apply(|state| {
            let (index, base) = target(state, id)?;
            Ok(edit(base, index, patch))
        })
    }

    /// Flips `completed`.
    pub fn toggle_todo(&self, id: &str) -> SyncResult<MutationTicket> {
        self.authorize(TodoPermission::Update)?;

        self.apply(|state| {
            let (index, base) = target(state, id)?;
            Ok(edit(base, index, TodoPatch::completed(!base.completed)))
        })
    }

    pub fn delete_todo(&self, id: &str) -> SyncResult<MutationTicket> {
        self.authorize(TodoPermission::Delete)?;

        self.apply(|state| {
            let (index, base) = target(state, id)?;
            Ok(Planned {
                operation: PendingOperation::delete(base, next_timestamp(base.updated_at)),
                optimistic: TodoAction::OptimisticDeleteTodo {
                    id: base.id.clone(),
                },
                revert: Revert::Restore {
                    todo: base.clone(),
                    index,
                },
            })
        })
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    pub(crate) fn authorize(&self, permission: TodoPermission) -> SyncResult<()> {
        if self.auth.allows(permission) {
            Ok(())
        } else {
            debug!(%permission, "Intent rejected by auth context");
            Err(CoreError::PermissionDenied { action: permission }.into())
        }
    }

    /// Plans against the current state and applies the optimistic change and
    /// the queue entry as one store step.
    fn apply<F>(&self, plan: F) -> SyncResult<MutationTicket>
    where
        F: FnOnce(&TodoState) -> Result<Planned, CoreError>,
    {
        let mut planned = None;
        self.store().transact(|state| {
            let result = plan(state);
            let actions = match result {
                Ok(ref p) => vec![
                    p.optimistic.clone(),
                    TodoAction::AddPendingOperation(p.operation.clone()),
                ],
                Err(_) => Vec::new(),
            };
            planned = Some(result);
            actions
        });

        let Planned {
            operation, revert, ..
        } = planned.ok_or_else(|| SyncError::Internal("intent was not planned".into()))??;
        self.executor.remember_revert(&operation.id, revert);

        info!(
            operation_id = %operation.id,
            kind = %operation.kind,
            todo_id = %operation.todo_id,
            "Applied optimistic change"
        );

        Ok(self.submit(operation))
    }

    /// Hands the operation to its todo's sequencer lane.
    pub(crate) fn submit(&self, operation: PendingOperation) -> MutationTicket {
        let (tx, rx) = oneshot::channel();
        let ticket = MutationTicket {
            operation_id: operation.id.clone(),
            todo_id: operation.todo_id.clone(),
            rx,
        };

        if !self.executor.can_deliver() {
            debug!(operation_id = %operation.id, "Offline, operation left for the next sync");
            let _ = tx.send(MutationOutcome::Queued);
            return ticket;
        }

        let claim = self.executor.claim(&operation);
        let executor = self.executor.clone();
        let operation_id = operation.id.clone();

        self.sequencer.submit(&operation.todo_id, async move {
            let outcome = deliver(&executor, &operation_id).await;
            drop(claim);
            debug!(operation_id = %operation_id, ?outcome, "Delivery finished");
            let _ = tx.send(outcome);
        });

        ticket
    }
}

/// Attempts delivery until it settles, sleeping between failed attempts.
async fn deliver(executor: &OperationExecutor, operation_id: &str) -> MutationOutcome {
    loop {
        if !executor.can_deliver() {
            return MutationOutcome::Queued;
        }

        match executor.attempt(operation_id).await {
            Attempt::Confirmed(server) => return MutationOutcome::Confirmed(server),
            Attempt::Conflicted => return MutationOutcome::Conflicted,
            Attempt::Blocked => return MutationOutcome::Queued,
            Attempt::Missing => return MutationOutcome::Superseded,
            Attempt::Abandoned(message) => return MutationOutcome::Abandoned(message),
            Attempt::Failed { retry_count, .. } => {
                let delay = executor.policy().delay_for(retry_count);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// The todo an update/delete intent targets.
fn target<'a>(state: &'a TodoState, id: &str) -> Result<(usize, &'a Todo), CoreError> {
    if state.is_conflicted(id) {
        return Err(CoreError::TodoInConflict(id.to_string()));
    }
    state
        .todos
        .iter()
        .enumerate()
        .find(|(_, t)| t.id == id)
        .ok_or_else(|| CoreError::TodoNotFound(id.to_string()))
}

fn edit(base: &Todo, index: usize, patch: TodoPatch) -> Planned {
    let now = next_timestamp(base.updated_at);
    Planned {
        optimistic: TodoAction::OptimisticUpdateTodo(base.patched(&patch, now)),
        operation: PendingOperation::update(base, patch, now),
        revert: Revert::Restore {
            todo: base.clone(),
            index,
        },
    }
}
