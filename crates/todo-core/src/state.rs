//! # Todo State
//!
//! The single aggregate the reducer owns, plus the read-only views callers
//! derive from it (stats, visible todos, status strings).
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TodoState                                                              │
//! │  ├── todos               ← persisted                                   │
//! │  ├── pending_operations  ← persisted, FIFO                             │
//! │  ├── conflicted_todos    ← persisted                                   │
//! │  ├── last_sync_at        ← persisted                                   │
//! │  ├── is_offline_mode     ← persisted (sticky)                          │
//! │  ├── sync_errors         ← session only, user-clearable                │
//! │  ├── sync_status         ← session only                                │
//! │  ├── connection_status   ← session only                                │
//! │  └── filter/loading/error← view state                                  │
//! │                                                                         │
//! │  Writers: reducer::reduce only.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::filter::TodoFilter;
use crate::types::{
    ConflictedTodo, ConnectionStatus, PendingOperation, Priority, SyncStatus, Todo,
};

// =============================================================================
// Todo State
// =============================================================================

/// Aggregate state of the sync core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoState {
    pub todos: Vec<Todo>,
    pub pending_operations: Vec<PendingOperation>,
    pub conflicted_todos: Vec<ConflictedTodo>,
    pub sync_errors: Vec<String>,
    pub sync_status: SyncStatus,
    pub connection_status: ConnectionStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_offline_mode: bool,

    // View state
    pub filter: TodoFilter,
    pub is_loading: bool,
    /// Transient, non-sync error shown by the caller (cleared by SyncStart).
    pub error: Option<String>,
}

impl TodoState {
    /// Rebuilds a state from its persisted part.
    ///
    /// Duplicate todo ids keep their first occurrence, so a damaged snapshot
    /// can never break id uniqueness.
    pub fn from_persisted(persisted: PersistedState) -> Self {
        TodoState {
            todos: dedupe_by_id(persisted.todos),
            pending_operations: persisted.pending_operations,
            conflicted_todos: persisted.conflicted_todos,
            last_sync_at: persisted.last_sync_at,
            is_offline_mode: persisted.is_offline_mode,
            ..Default::default()
        }
    }

    /// The part of the state that must survive a restart.
    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            todos: self.todos.clone(),
            pending_operations: self.pending_operations.clone(),
            conflicted_todos: self.conflicted_todos.clone(),
            last_sync_at: self.last_sync_at,
            is_offline_mode: self.is_offline_mode,
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn find(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn pending_operation(&self, operation_id: &str) -> Option<&PendingOperation> {
        self.pending_operations.iter().find(|op| op.id == operation_id)
    }

    /// Queued operations for one todo, oldest first.
    pub fn pending_for<'a>(
        &'a self,
        todo_id: &'a str,
    ) -> impl Iterator<Item = &'a PendingOperation> + 'a {
        self.pending_operations
            .iter()
            .filter(move |op| op.todo_id == todo_id)
    }

    pub fn has_pending(&self, todo_id: &str) -> bool {
        self.pending_for(todo_id).next().is_some()
    }

    pub fn conflict(&self, todo_id: &str) -> Option<&ConflictedTodo> {
        self.conflicted_todos.iter().find(|c| c.todo_id() == todo_id)
    }

    pub fn is_conflicted(&self, todo_id: &str) -> bool {
        self.conflict(todo_id).is_some()
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Todos passing the current filter, in list order.
    pub fn visible_todos(&self) -> Vec<&Todo> {
        self.todos.iter().filter(|t| self.filter.matches(t)).collect()
    }

    pub fn stats(&self) -> TodoStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> TodoStats {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|t| t.completed).count();
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        TodoStats {
            total,
            completed,
            active: total - completed,
            high_priority: self
                .todos
                .iter()
                .filter(|t| !t.completed && t.priority == Priority::High)
                .count(),
            overdue: self.todos.iter().filter(|t| t.is_overdue(now)).count(),
            pending_operations: self.pending_operations.len(),
            conflicts: self.conflicted_todos.len(),
            completion_rate,
        }
    }

    /// Human-readable connection line.
    pub fn connection_status_text(&self) -> String {
        match (self.connection_status, self.is_offline_mode) {
            (ConnectionStatus::Offline, _) => {
                "Offline - changes will sync when reconnected".to_string()
            }
            (ConnectionStatus::Online, true) => "Online (offline mode)".to_string(),
            (ConnectionStatus::Online, false) => "Online".to_string(),
            (ConnectionStatus::Unknown, _) => "Checking connection...".to_string(),
        }
    }

    /// Human-readable sync line.
    pub fn sync_status_text(&self) -> String {
        let pending = self.pending_operations.len();
        match self.sync_status {
            SyncStatus::Syncing => "Syncing...".to_string(),
            SyncStatus::Error => match self.sync_errors.last() {
                Some(last) => format!("Sync failed: {}", last),
                None => "Sync failed".to_string(),
            },
            _ if pending == 1 => "1 change pending".to_string(),
            _ if pending > 1 => format!("{} changes pending", pending),
            SyncStatus::Success => "All changes synced".to_string(),
            SyncStatus::Idle if self.last_sync_at.is_some() => "Up to date".to_string(),
            SyncStatus::Idle => "Not synced yet".to_string(),
        }
    }
}

/// Keeps the first todo for each id.
pub(crate) fn dedupe_by_id(todos: Vec<Todo>) -> Vec<Todo> {
    let mut seen = HashSet::with_capacity(todos.len());
    todos
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

// =============================================================================
// Persisted State
// =============================================================================

/// What the local durable store reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default)]
    pub pending_operations: Vec<PendingOperation>,
    #[serde(default)]
    pub conflicted_todos: Vec<ConflictedTodo>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_offline_mode: bool,
}

// =============================================================================
// Stats
// =============================================================================

/// Counts shown next to the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TodoStats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    /// Open todos with high priority.
    pub high_priority: usize,
    pub overdue: usize,
    pub pending_operations: usize,
    pub conflicts: usize,
    /// Completed / total, in `0.0..=1.0`. Zero for an empty list.
    pub completion_rate: f64,
}

impl TodoStats {
    /// Completion rate as a whole percentage.
    pub fn completion_percent(&self) -> u8 {
        (self.completion_rate * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTodo;
    use chrono::Duration;

    fn todo(id: &str, completed: bool) -> Todo {
        let mut todo = NewTodo::new(format!("todo {}", id)).into_todo(
            id.to_string(),
            "guest".into(),
            Utc::now(),
        );
        todo.completed = completed;
        todo
    }

    #[test]
    fn test_stats_on_empty_state() {
        let stats = TodoState::default().stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.completion_rate, 0.0);
        assert_eq!(stats.completion_percent(), 0);
    }

    #[test]
    fn test_stats_counts() {
        let now = Utc::now();
        let mut overdue = todo("c", false);
        overdue.due_date = Some(now - Duration::days(1));
        overdue.priority = Priority::High;

        let state = TodoState {
            todos: vec![todo("a", true), todo("b", false), overdue],
            ..Default::default()
        };
        let stats = state.stats_at(now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.high_priority, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.completion_percent(), 33);
    }

    #[test]
    fn test_from_persisted_dedupes_ids() {
        let state = TodoState::from_persisted(PersistedState {
            todos: vec![todo("a", false), todo("a", true), todo("b", false)],
            is_offline_mode: true,
            ..Default::default()
        });
        assert_eq!(state.todos.len(), 2);
        assert!(!state.todos[0].completed);
        assert!(state.is_offline_mode);
        assert_eq!(state.sync_status, SyncStatus::Idle);
    }

    #[test]
    fn test_status_text() {
        let mut state = TodoState::default();
        assert_eq!(state.connection_status_text(), "Checking connection...");
        assert_eq!(state.sync_status_text(), "Not synced yet");

        state.connection_status = ConnectionStatus::Online;
        state.is_offline_mode = true;
        assert_eq!(state.connection_status_text(), "Online (offline mode)");

        state.sync_status = SyncStatus::Error;
        state.sync_errors.push("timeout".into());
        assert_eq!(state.sync_status_text(), "Sync failed: timeout");

        state.sync_status = SyncStatus::Success;
        assert_eq!(state.sync_status_text(), "All changes synced");

        let base = todo("a", false);
        state
            .pending_operations
            .push(PendingOperation::delete(&base, Utc::now()));
        assert_eq!(state.sync_status_text(), "1 change pending");
    }

    #[test]
    fn test_visible_todos_follow_filter() {
        let state = TodoState {
            todos: vec![todo("a", true), todo("b", false)],
            filter: TodoFilter::status(crate::filter::StatusFilter::Active),
            ..Default::default()
        };
        let visible = state.visible_todos();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "b");
    }
}
