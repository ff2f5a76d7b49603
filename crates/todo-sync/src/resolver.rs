//! # Conflict Resolver
//!
//! Conflicted todos sit outside automatic reconciliation until someone
//! decides which version wins. The engine does not decide; it applies a
//! [`ConflictStrategy`] chosen by the caller or by a [`ConflictPolicy`].
//!
//! ```text
//!   ConflictedTodo { local, remote }
//!          │
//!          ├── KeepRemote ──► local := remote, queued ops for the todo dropped
//!          │
//!          ├── KeepLocal  ──► local kept, queued ops dropped, one UPDATE
//!          │                  (or DELETE) queued against the remote version
//!          │
//!          └── Manual(t)  ──► local := t, queued ops dropped, one UPDATE queued
//! ```
//!
//! Writes queued by a resolution carry the remote `updated_at` as their base,
//! so the next reconciliation pass does not raise the same conflict again.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::coordinator::{Coordinator, MutationTicket};
use crate::error::{SyncError, SyncResult};
use crate::executor::Revert;
use todo_core::validation::validate_patch;
use todo_core::{
    next_timestamp, ConflictedTodo, CoreError, PendingOperation, Todo, TodoAction, TodoPatch,
    TodoPermission, TodoState,
};

/// Which version of a conflicted todo survives.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictStrategy {
    KeepLocal,
    KeepRemote,
    /// A caller-merged version. Its id is forced to the conflicted todo's id.
    Manual(Todo),
}

impl ConflictStrategy {
    fn writes_remote(&self) -> bool {
        !matches!(self, ConflictStrategy::KeepRemote)
    }
}

/// Decides conflicts in bulk.
pub trait ConflictPolicy: Send + Sync {
    fn decide(&self, conflict: &ConflictedTodo) -> ConflictStrategy;
}

/// A fixed strategy applied to every conflict.
impl ConflictPolicy for ConflictStrategy {
    fn decide(&self, _conflict: &ConflictedTodo) -> ConflictStrategy {
        self.clone()
    }
}

/// Prefers whichever version was modified last. Ties go to the remote.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestWins;

impl ConflictPolicy for NewestWins {
    fn decide(&self, conflict: &ConflictedTodo) -> ConflictStrategy {
        if conflict.local.updated_at > conflict.remote.updated_at {
            ConflictStrategy::KeepLocal
        } else {
            ConflictStrategy::KeepRemote
        }
    }
}

struct Resolution {
    actions: Vec<TodoAction>,
    follow_up: Option<(PendingOperation, Revert)>,
}

/// Applies conflict resolutions.
#[derive(Clone)]
pub struct ConflictResolver {
    coordinator: Coordinator,
}

impl ConflictResolver {
    pub fn new(coordinator: Coordinator) -> Self {
        ConflictResolver { coordinator }
    }

    pub fn conflicts(&self) -> Vec<ConflictedTodo> {
        self.coordinator
            .store()
            .read(|s| s.conflicted_todos.clone())
    }

    /// Resolves the conflict on `todo_id`. Returns a ticket for the remote
    /// write when the strategy needs one.
    pub fn resolve(
        &self,
        todo_id: &str,
        strategy: ConflictStrategy,
    ) -> SyncResult<Option<MutationTicket>> {
        let store = self.coordinator.store();

        if strategy.writes_remote() {
            let locally_deleted = store.read(|s| !s.contains(todo_id));
            let permission = if locally_deleted && strategy == ConflictStrategy::KeepLocal {
                TodoPermission::Delete
            } else {
                TodoPermission::Update
            };
            self.coordinator.authorize(permission)?;
        }
        if let ConflictStrategy::Manual(ref merged) = strategy {
            validate_patch(&TodoPatch::replace_with(merged)).map_err(CoreError::from)?;
        }

        let mut planned = None;
        store.transact(|state| {
            let result = plan(state, todo_id, &strategy, Utc::now());
            let actions = match result {
                Ok(ref r) => r.actions.clone(),
                Err(_) => Vec::new(),
            };
            planned = Some(result);
            actions
        });

        let resolution = planned
            .ok_or_else(|| SyncError::Internal("resolution was not planned".into()))??;

        let executor = self.coordinator.executor();
        store.read(|s| executor.prune_reverts(s));

        info!(todo_id, ?strategy, "Conflict resolved");

        Ok(resolution.follow_up.map(|(operation, revert)| {
            executor.remember_revert(&operation.id, revert);
            self.coordinator.submit(operation)
        }))
    }

    /// Resolves every open conflict with `policy`. Stops at the first error.
    pub fn resolve_all(
        &self,
        policy: &dyn ConflictPolicy,
    ) -> SyncResult<Vec<MutationTicket>> {
        let mut tickets = Vec::new();
        for conflict in self.conflicts() {
            let strategy = policy.decide(&conflict);
            if let Some(ticket) = self.resolve(conflict.todo_id(), strategy)? {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    /// Drops every conflict record without touching todos or the queue.
    pub fn clear(&self) {
        let count = self.coordinator.store().read(|s| s.conflicted_todos.len());
        if count > 0 {
            info!(count, "Clearing conflict records");
            self.coordinator
                .store()
                .dispatch(TodoAction::ClearConflictedTodos);
        }
    }
}

fn plan(
    state: &TodoState,
    todo_id: &str,
    strategy: &ConflictStrategy,
    now: DateTime<Utc>,
) -> SyncResult<Resolution> {
    let conflict = state
        .conflict(todo_id)
        .ok_or_else(|| SyncError::NotInConflict(todo_id.to_string()))?;
    let remote = &conflict.remote;

    let mut actions: Vec<TodoAction> = state
        .pending_for(todo_id)
        .map(|op| TodoAction::RemovePendingOperation {
            operation_id: op.id.clone(),
        })
        .collect();

    let index = state
        .todos
        .iter()
        .position(|t| t.id == todo_id)
        .unwrap_or(state.todos.len());

    let (resolved, operation) = match strategy {
        ConflictStrategy::KeepRemote => (Some(remote.clone()), None),
        ConflictStrategy::KeepLocal if !state.contains(todo_id) => {
            (None, Some(PendingOperation::delete(remote, now)))
        }
        ConflictStrategy::KeepLocal => {
            let todo = rebased(&conflict.local, remote);
            let operation = PendingOperation::update(remote, TodoPatch::replace_with(&todo), now);
            (Some(todo), Some(operation))
        }
        ConflictStrategy::Manual(merged) => {
            let todo = rebased(merged, remote);
            let operation = PendingOperation::update(remote, TodoPatch::replace_with(&todo), now);
            (Some(todo), Some(operation))
        }
    };

    actions.push(TodoAction::ResolveConflictedTodo {
        todo_id: todo_id.to_string(),
        resolved,
    });
    if let Some(ref op) = operation {
        actions.push(TodoAction::AddPendingOperation(op.clone()));
    }

    Ok(Resolution {
        actions,
        follow_up: operation.map(|op| {
            (
                op,
                Revert::Restore {
                    todo: remote.clone(),
                    index,
                },
            )
        }),
    })
}

/// `chosen`'s content on top of the remote record's identity.
fn rebased(chosen: &Todo, remote: &Todo) -> Todo {
    Todo {
        id: remote.id.clone(),
        created_at: remote.created_at,
        user_id: remote.user_id.clone(),
        updated_at: next_timestamp(chosen.updated_at.max(remote.updated_at)),
        ..chosen.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::StaticAuth;
    use crate::coordinator::MutationOutcome;
    use crate::remote::InMemoryTodoApi;
    use crate::retry::RetryPolicy;
    use crate::store::TodoStore;
    use todo_core::NewTodo;

    struct Fixture {
        resolver: ConflictResolver,
        store: TodoStore,
        remote: Arc<InMemoryTodoApi>,
        theirs: Todo,
    }

    /// Local "Mine" with a queued update, remote edited to "Theirs".
    async fn conflicted(auth: StaticAuth) -> Fixture {
        let store = TodoStore::default();
        let remote = Arc::new(InMemoryTodoApi::new());
        let coordinator = Coordinator::new(
            store.clone(),
            remote.clone(),
            Arc::new(auth),
            RetryPolicy::immediate(3),
            true,
        );

        let original = remote
            .put(NewTodo::new("Original").into_todo("a".into(), "guest".into(), Utc::now()))
            .await;
        let theirs = remote
            .edit("a", &TodoPatch::title("Theirs"))
            .await
            .unwrap();

        let patch = TodoPatch::title("Mine");
        let mine = original.patched(&patch, next_timestamp(original.updated_at));
        store.dispatch(TodoAction::LoadTodos(vec![mine.clone()]));
        store.dispatch(TodoAction::AddPendingOperation(PendingOperation::update(
            &original,
            patch,
            Utc::now(),
        )));
        store.dispatch(TodoAction::AddConflictedTodo(ConflictedTodo {
            local: mine,
            remote: theirs.clone(),
            detected_at: Utc::now(),
        }));

        Fixture {
            resolver: ConflictResolver::new(coordinator),
            store,
            remote,
            theirs,
        }
    }

    #[tokio::test]
    async fn test_keep_remote_adopts_remote_version() {
        let f = conflicted(StaticAuth::guest()).await;

        let ticket = f
            .resolver
            .resolve("a", ConflictStrategy::KeepRemote)
            .unwrap();
        assert!(ticket.is_none());

        let state = f.store.state();
        assert!(state.conflicted_todos.is_empty());
        assert!(state.pending_operations.is_empty());
        assert_eq!(state.todos, vec![f.theirs]);
    }

    #[tokio::test]
    async fn test_keep_local_pushes_local_version() {
        let f = conflicted(StaticAuth::guest()).await;

        let ticket = f
            .resolver
            .resolve("a", ConflictStrategy::KeepLocal)
            .unwrap()
            .unwrap();
        {
            let state = f.store.state();
            assert!(state.conflicted_todos.is_empty());
            assert_eq!(state.find("a").unwrap().title, "Mine");
            let op = &state.pending_operations[0];
            assert_eq!(op.base_updated_at, Some(f.theirs.updated_at));
        }

        assert!(ticket.outcome().await.is_confirmed());
        assert_eq!(f.remote.get("a").await.unwrap().title, "Mine");
        assert!(f.store.state().pending_operations.is_empty());
    }

    #[tokio::test]
    async fn test_manual_merge_keeps_identity() {
        let f = conflicted(StaticAuth::guest()).await;

        let mut merged = f.theirs.clone();
        merged.id = "ignored".into();
        merged.title = "Mine and theirs".into();

        let ticket = f
            .resolver
            .resolve("a", ConflictStrategy::Manual(merged))
            .unwrap()
            .unwrap();
        assert_eq!(ticket.todo_id(), "a");
        assert!(matches!(
            ticket.outcome().await,
            MutationOutcome::Confirmed(Some(_))
        ));

        let stored = f.remote.get("a").await.unwrap();
        assert_eq!(stored.title, "Mine and theirs");
        assert_eq!(f.store.state().todos, vec![stored]);
    }

    #[tokio::test]
    async fn test_manual_merge_is_validated() {
        let f = conflicted(StaticAuth::guest()).await;

        let mut merged = f.theirs.clone();
        merged.title = "   ".into();

        let err = f
            .resolver
            .resolve("a", ConflictStrategy::Manual(merged))
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(f.store.state().conflicted_todos.len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_user_can_only_keep_remote() {
        let f = conflicted(StaticAuth::read_only("viewer")).await;

        let err = f
            .resolver
            .resolve("a", ConflictStrategy::KeepLocal)
            .unwrap_err();
        assert!(err.is_rejection());

        assert!(f
            .resolver
            .resolve("a", ConflictStrategy::KeepRemote)
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_conflict() {
        let f = conflicted(StaticAuth::guest()).await;
        assert!(matches!(
            f.resolver.resolve("nope", ConflictStrategy::KeepRemote),
            Err(SyncError::NotInConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_with_policy() {
        let f = conflicted(StaticAuth::guest()).await;

        let tickets = f.resolver.resolve_all(&ConflictStrategy::KeepRemote).unwrap();
        assert!(tickets.is_empty());
        assert!(f.resolver.conflicts().is_empty());
    }

    #[test]
    fn test_newest_wins() {
        let now = Utc::now();
        let older = NewTodo::new("Old").into_todo("a".into(), "guest".into(), now);
        let newer = Todo {
            updated_at: next_timestamp(now),
            ..older.clone()
        };

        let local_newer = ConflictedTodo {
            local: newer.clone(),
            remote: older.clone(),
            detected_at: now,
        };
        assert_eq!(NewestWins.decide(&local_newer), ConflictStrategy::KeepLocal);

        let remote_newer = ConflictedTodo {
            local: older,
            remote: newer,
            detected_at: now,
        };
        assert_eq!(NewestWins.decide(&remote_newer), ConflictStrategy::KeepRemote);
    }

    #[tokio::test]
    async fn test_clear_keeps_todos() {
        let f = conflicted(StaticAuth::guest()).await;
        f.resolver.clear();

        let state = f.store.state();
        assert!(state.conflicted_todos.is_empty());
        assert_eq!(state.todos.len(), 1);
    }
}
