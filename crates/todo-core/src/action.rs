//! # Reducer Actions
//!
//! Every transition `TodoState` can undergo. Components never touch state
//! directly: they describe what happened as a `TodoAction` and hand it to the
//! store, which runs it through [`crate::reducer::reduce`].
//!
//! ## Action Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CRUD            AddTodo, UpdateTodo, DeleteTodo, ToggleTodo           │
//! │  Housekeeping    SetFilter, SetLoading, SetError, LoadTodos, ClearTodos│
//! │  Sync            SyncStart, SyncSuccess, SyncError, ClearSyncErrors    │
//! │  Queue           Add/Remove/UpdatePendingOperation,                    │
//! │                  ClearPendingOperations, ConfirmOperation              │
//! │  Connection      SetConnectionStatus, SetOfflineMode                   │
//! │  Conflicts       Add/ResolveConflictedTodo, ClearConflictedTodos       │
//! │  Optimistic      OptimisticAdd/Update/DeleteTodo,                      │
//! │                  RollbackOptimisticOperation                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::TodoFilter;
use crate::types::{ConflictedTodo, ConnectionStatus, NewTodo, PendingOperation, Todo, TodoPatch};

/// A state transition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoAction {
    // -------------------------------------------------------------------------
    // CRUD
    // -------------------------------------------------------------------------
    /// Creates a todo from raw input, minting id and timestamps.
    AddTodo { input: NewTodo, user_id: String },
    UpdateTodo { id: String, patch: TodoPatch },
    DeleteTodo { id: String },
    ToggleTodo { id: String },

    // -------------------------------------------------------------------------
    // Housekeeping
    // -------------------------------------------------------------------------
    SetFilter(TodoFilter),
    SetLoading(bool),
    SetError(Option<String>),
    /// Replaces the todo list (duplicate ids keep their first occurrence).
    LoadTodos(Vec<Todo>),
    ClearTodos,

    // -------------------------------------------------------------------------
    // Sync lifecycle
    // -------------------------------------------------------------------------
    SyncStart,
    /// A full reconciliation finished. Authoritative: clears the queue.
    SyncSuccess {
        last_sync_at: DateTime<Utc>,
        synced_todos: Option<Vec<Todo>>,
    },
    SyncError { message: String },
    ClearSyncErrors,

    // -------------------------------------------------------------------------
    // Pending operation queue
    // -------------------------------------------------------------------------
    AddPendingOperation(PendingOperation),
    RemovePendingOperation { operation_id: String },
    /// Replaces the queued operation with the same id, in place.
    UpdatePendingOperation(PendingOperation),
    ClearPendingOperations,
    /// The remote store acknowledged an operation.
    ConfirmOperation {
        operation_id: String,
        server_todo: Option<Todo>,
    },

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------
    SetConnectionStatus(ConnectionStatus),
    SetOfflineMode(bool),

    // -------------------------------------------------------------------------
    // Conflicts
    // -------------------------------------------------------------------------
    AddConflictedTodo(ConflictedTodo),
    /// Drops the conflict record; `resolved` (if any) becomes the local todo.
    ResolveConflictedTodo {
        todo_id: String,
        resolved: Option<Todo>,
    },
    ClearConflictedTodos,

    // -------------------------------------------------------------------------
    // Optimistic updates (todos only, never the queue)
    // -------------------------------------------------------------------------
    OptimisticAddTodo(Todo),
    OptimisticUpdateTodo(Todo),
    OptimisticDeleteTodo { id: String },
    RollbackOptimisticOperation {
        operation_id: String,
        previous_state: Option<Vec<Todo>>,
    },
}

impl TodoAction {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TodoAction::AddTodo { .. } => "ADD_TODO",
            TodoAction::UpdateTodo { .. } => "UPDATE_TODO",
            TodoAction::DeleteTodo { .. } => "DELETE_TODO",
            TodoAction::ToggleTodo { .. } => "TOGGLE_TODO",
            TodoAction::SetFilter(_) => "SET_FILTER",
            TodoAction::SetLoading(_) => "SET_LOADING",
            TodoAction::SetError(_) => "SET_ERROR",
            TodoAction::LoadTodos(_) => "LOAD_TODOS",
            TodoAction::ClearTodos => "CLEAR_TODOS",
            TodoAction::SyncStart => "SYNC_START",
            TodoAction::SyncSuccess { .. } => "SYNC_SUCCESS",
            TodoAction::SyncError { .. } => "SYNC_ERROR",
            TodoAction::ClearSyncErrors => "CLEAR_SYNC_ERRORS",
            TodoAction::AddPendingOperation(_) => "ADD_PENDING_OPERATION",
            TodoAction::RemovePendingOperation { .. } => "REMOVE_PENDING_OPERATION",
            TodoAction::UpdatePendingOperation(_) => "UPDATE_PENDING_OPERATION",
            TodoAction::ClearPendingOperations => "CLEAR_PENDING_OPERATIONS",
            TodoAction::ConfirmOperation { .. } => "CONFIRM_OPERATION",
            TodoAction::SetConnectionStatus(_) => "SET_CONNECTION_STATUS",
            TodoAction::SetOfflineMode(_) => "SET_OFFLINE_MODE",
            TodoAction::AddConflictedTodo(_) => "ADD_CONFLICTED_TODO",
            TodoAction::ResolveConflictedTodo { .. } => "RESOLVE_CONFLICTED_TODO",
            TodoAction::ClearConflictedTodos => "CLEAR_CONFLICTED_TODOS",
            TodoAction::OptimisticAddTodo(_) => "OPTIMISTIC_ADD_TODO",
            TodoAction::OptimisticUpdateTodo(_) => "OPTIMISTIC_UPDATE_TODO",
            TodoAction::OptimisticDeleteTodo { .. } => "OPTIMISTIC_DELETE_TODO",
            TodoAction::RollbackOptimisticOperation { .. } => "ROLLBACK_OPTIMISTIC_OPERATION",
        }
    }

    /// True for actions that change what must survive a restart.
    pub fn touches_persisted_state(&self) -> bool {
        !matches!(
            self,
            TodoAction::SetFilter(_)
                | TodoAction::SetLoading(_)
                | TodoAction::SetError(_)
                | TodoAction::SyncStart
                | TodoAction::SetConnectionStatus(ConnectionStatus::Online)
                | TodoAction::SetConnectionStatus(ConnectionStatus::Unknown)
        )
    }
}
