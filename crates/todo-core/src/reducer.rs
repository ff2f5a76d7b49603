//! # Mutation Reducer
//!
//! `reduce(state, action) -> state`: the only function allowed to produce a
//! new `TodoState`.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  • Total: every action yields a valid state, nothing panics            │
//! │  • No validation: unknown ids are silent no-ops                        │
//! │  • No I/O: the clock and UUIDs are the only outside inputs             │
//! │  • Ids in `todos` stay unique whatever the input                       │
//! │  • A queued operation's retry_count never decreases                    │
//! │  • Optimistic actions touch `todos` only, never the queue              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SYNC_SUCCESS is authoritative
//! A successful full reconciliation replaces the todo list (when a list is
//! supplied) and drops every queued operation and sync error. Operations
//! queued while the pass was running are re-queued by the orchestrator after
//! this action, not here.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::action::TodoAction;
use crate::state::{dedupe_by_id, TodoState};
use crate::types::{ConnectionStatus, SyncStatus, Todo};

/// Applies one action.
pub fn reduce(mut state: TodoState, action: TodoAction) -> TodoState {
    match action {
        // ---------------------------------------------------------------------
        // CRUD
        // ---------------------------------------------------------------------
        TodoAction::AddTodo { input, user_id } => {
            let todo = input.into_todo(Uuid::new_v4().to_string(), user_id, Utc::now());
            state.todos.push(todo);
        }

        TodoAction::UpdateTodo { id, patch } => match position(&state, &id) {
            Some(idx) => {
                let now = next_timestamp(state.todos[idx].updated_at);
                state.todos[idx].apply_patch(&patch, now);
            }
            None => debug!(id = %id, "UPDATE_TODO for unknown todo ignored"),
        },

        TodoAction::DeleteTodo { id } => {
            state.todos.retain(|t| t.id != id);
        }

        TodoAction::ToggleTodo { id } => match position(&state, &id) {
            Some(idx) => {
                let todo = &mut state.todos[idx];
                todo.completed = !todo.completed;
                todo.updated_at = next_timestamp(todo.updated_at);
            }
            None => debug!(id = %id, "TOGGLE_TODO for unknown todo ignored"),
        },

        // ---------------------------------------------------------------------
        // Housekeeping
        // ---------------------------------------------------------------------
        TodoAction::SetFilter(filter) => state.filter = filter,
        TodoAction::SetLoading(loading) => state.is_loading = loading,
        TodoAction::SetError(error) => state.error = error,
        TodoAction::LoadTodos(todos) => {
            state.todos = dedupe_by_id(todos);
            state.is_loading = false;
        }
        TodoAction::ClearTodos => state.todos.clear(),

        // ---------------------------------------------------------------------
        // Sync lifecycle
        // ---------------------------------------------------------------------
        TodoAction::SyncStart => {
            state.sync_status = SyncStatus::Syncing;
            state.error = None;
        }

        TodoAction::SyncSuccess {
            last_sync_at,
            synced_todos,
        } => {
            state.sync_status = SyncStatus::Success;
            state.last_sync_at = Some(last_sync_at);
            if let Some(todos) = synced_todos {
                state.todos = dedupe_by_id(todos);
            }
            state.pending_operations.clear();
            state.sync_errors.clear();
        }

        TodoAction::SyncError { message } => {
            state.sync_status = SyncStatus::Error;
            state.sync_errors.push(message);
        }

        TodoAction::ClearSyncErrors => {
            state.sync_errors.clear();
            if state.sync_status == SyncStatus::Error {
                state.sync_status = SyncStatus::Idle;
            }
        }

        // ---------------------------------------------------------------------
        // Queue bookkeeping
        // ---------------------------------------------------------------------
        TodoAction::AddPendingOperation(op) => {
            if state.pending_operation(&op.id).is_none() {
                state.pending_operations.push(op);
            }
        }

        TodoAction::RemovePendingOperation { operation_id } => {
            state.pending_operations.retain(|op| op.id != operation_id);
        }

        TodoAction::UpdatePendingOperation(mut updated) => {
            match state
                .pending_operations
                .iter_mut()
                .find(|op| op.id == updated.id)
            {
                Some(existing) => {
                    updated.retry_count = updated.retry_count.max(existing.retry_count);
                    *existing = updated;
                }
                // Never resurrect an operation that already left the queue
                None => debug!(operation_id = %updated.id, "UPDATE_PENDING_OPERATION for unknown operation ignored"),
            }
        }

        TodoAction::ClearPendingOperations => state.pending_operations.clear(),

        TodoAction::ConfirmOperation {
            operation_id,
            server_todo,
        } => {
            state.pending_operations.retain(|op| op.id != operation_id);
            if let Some(server) = server_todo {
                merge_confirmed(&mut state, server);
            }
        }

        // ---------------------------------------------------------------------
        // Connection
        // ---------------------------------------------------------------------
        TodoAction::SetConnectionStatus(status) => {
            state.connection_status = status;
            // Sticky: only SET_OFFLINE_MODE(false) clears it
            if status == ConnectionStatus::Offline {
                state.is_offline_mode = true;
            }
        }

        TodoAction::SetOfflineMode(enabled) => state.is_offline_mode = enabled,

        // ---------------------------------------------------------------------
        // Conflicts
        // ---------------------------------------------------------------------
        TodoAction::AddConflictedTodo(conflict) => {
            match state
                .conflicted_todos
                .iter_mut()
                .find(|c| c.todo_id() == conflict.todo_id())
            {
                Some(existing) => *existing = conflict,
                None => state.conflicted_todos.push(conflict),
            }
        }

        TodoAction::ResolveConflictedTodo { todo_id, resolved } => {
            state.conflicted_todos.retain(|c| c.todo_id() != todo_id);
            if let Some(todo) = resolved {
                upsert(&mut state, todo);
            }
        }

        TodoAction::ClearConflictedTodos => state.conflicted_todos.clear(),

        // ---------------------------------------------------------------------
        // Optimistic updates
        // ---------------------------------------------------------------------
        TodoAction::OptimisticAddTodo(todo) => {
            if state.contains(&todo.id) {
                debug!(id = %todo.id, "OPTIMISTIC_ADD_TODO for existing id ignored");
            } else {
                state.todos.push(todo);
            }
        }

        TodoAction::OptimisticUpdateTodo(todo) => match position(&state, &todo.id) {
            Some(idx) => state.todos[idx] = todo,
            None => debug!(id = %todo.id, "OPTIMISTIC_UPDATE_TODO for unknown todo ignored"),
        },

        TodoAction::OptimisticDeleteTodo { id } => {
            state.todos.retain(|t| t.id != id);
        }

        TodoAction::RollbackOptimisticOperation {
            operation_id,
            previous_state,
        } => {
            if let Some(todos) = previous_state {
                state.todos = dedupe_by_id(todos);
            }
            state.pending_operations.retain(|op| op.id != operation_id);
        }
    }

    state
}

fn position(state: &TodoState, id: &str) -> Option<usize> {
    state.todos.iter().position(|t| t.id == id)
}

fn upsert(state: &mut TodoState, todo: Todo) {
    match position(state, &todo.id) {
        Some(idx) => state.todos[idx] = todo,
        None => state.todos.push(todo),
    }
}

/// A timestamp strictly after `previous`, so every local edit is observable.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Folds a server-acknowledged todo into local state.
///
/// With no further queued edits for the todo the server version wins
/// outright. Otherwise the newer local edits stay visible, only the
/// server-owned fields are merged, and the next queued edit is rebased on the
/// server's `updated_at` so replay does not flag a false conflict.
fn merge_confirmed(state: &mut TodoState, server: Todo) {
    if state.is_conflicted(&server.id) {
        return;
    }

    if let Some(next) = state
        .pending_operations
        .iter_mut()
        .find(|op| op.todo_id == server.id && op.base_updated_at.is_some())
    {
        next.base_updated_at = Some(server.updated_at);
    }

    let has_later_edits = state.has_pending(&server.id);
    if let Some(idx) = position(state, &server.id) {
        if has_later_edits {
            let local = &mut state.todos[idx];
            local.created_at = server.created_at;
            local.user_id = server.user_id;
        } else {
            state.todos[idx] = server;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
