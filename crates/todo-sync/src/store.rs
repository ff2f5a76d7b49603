//! # Todo Store
//!
//! Owns the one live `TodoState` and is the only caller of
//! [`todo_core::reduce`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Coordinator ──┐                                                       │
//! │  Orchestrator ─┼── dispatch(action) ──► watch::Sender<TodoState>       │
//! │  Connection ───┤                          │  send_modify:              │
//! │  Resolver ─────┘                          │  state = reduce(state, a)  │
//! │                                           ▼                             │
//! │                           subscribers (persistence worker, UI)         │
//! │                                                                         │
//! │  Every write goes through the watch channel's write lock, so actions   │
//! │  apply one at a time in dispatch order.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use todo_core::{reduce, TodoAction, TodoState};

/// Shared handle to the engine state.
#[derive(Debug, Clone)]
pub struct TodoStore {
    tx: Arc<watch::Sender<TodoState>>,
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new(TodoState::default())
    }
}

impl TodoStore {
    pub fn new(initial: TodoState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        TodoStore { tx: Arc::new(tx) }
    }

    /// Runs one action through the reducer.
    pub fn dispatch(&self, action: TodoAction) {
        self.tx.send_modify(|state| apply(state, action));
    }

    /// Builds actions from the current state and applies them as one step.
    ///
    /// No other dispatch can interleave between reading the state and
    /// applying the returned actions.
    pub fn transact<F>(&self, build: F)
    where
        F: FnOnce(&TodoState) -> Vec<TodoAction>,
    {
        self.tx.send_modify(|state| {
            for action in build(state) {
                apply(state, action);
            }
        });
    }

    /// A copy of the current state.
    pub fn state(&self) -> TodoState {
        self.tx.borrow().clone()
    }

    /// Reads the current state without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&TodoState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Receives every subsequent state.
    pub fn subscribe(&self) -> watch::Receiver<TodoState> {
        self.tx.subscribe()
    }
}

fn apply(state: &mut TodoState, action: TodoAction) {
    debug!(action = action.name(), "Dispatch");
    let previous = std::mem::take(state);
    *state = reduce(previous, action);
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_core::{NewTodo, SyncStatus};

    #[test]
    fn test_dispatch_applies_reducer() {
        let store = TodoStore::default();
        store.dispatch(TodoAction::AddTodo {
            input: NewTodo::new("Buy milk"),
            user_id: "guest".into(),
        });
        store.dispatch(TodoAction::SyncStart);

        let state = store.state();
        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.sync_status, SyncStatus::Syncing);
        assert_eq!(store.read(|s| s.todos[0].title.clone()), "Buy milk");
    }

    #[test]
    fn test_transact_sees_state_and_applies_in_order() {
        let store = TodoStore::default();
        store.dispatch(TodoAction::SyncError {
            message: "first".into(),
        });

        store.transact(|state| {
            assert_eq!(state.sync_errors.len(), 1);
            vec![
                TodoAction::ClearSyncErrors,
                TodoAction::SyncError {
                    message: "second".into(),
                },
            ]
        });

        assert_eq!(store.state().sync_errors, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = TodoStore::default();
        let mut rx = store.subscribe();

        let clone = store.clone();
        clone.dispatch(TodoAction::SetLoading(true));

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading);
    }
}
