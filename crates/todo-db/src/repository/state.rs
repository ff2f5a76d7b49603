//! # State Repository
//!
//! Whole-snapshot save and load of the persisted state.
//!
//! ## Save
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. Rewrite todos               (position = list index)                │
//! │  2. Rewrite pending_operations  (position = queue index)               │
//! │  3. Rewrite conflicted_todos                                           │
//! │  4. Upsert sync_meta            (last_sync_at, is_offline_mode)        │
//! │                                                                         │
//! │  COMMIT ← a crash leaves either the old snapshot or the new one,       │
//! │           never a todo list from one save and a queue from another     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Load
//! Reads all four tables inside one transaction. Any undecodable row fails
//! the whole load with `DbError::Corrupt`; callers decide whether to start
//! over from an empty state.

use sqlx::SqlitePool;
use tracing::{debug, info};

use super::{conflict, meta, pending, todo};
use crate::error::{DbError, DbResult};
use todo_core::PersistedState;

/// Repository for the persisted snapshot as a whole.
#[derive(Debug, Clone)]
pub struct StateRepository {
    pool: SqlitePool,
}

impl StateRepository {
    /// Creates a new StateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StateRepository { pool }
    }

    /// Loads the last saved snapshot. An empty database yields the default.
    pub async fn load(&self) -> DbResult<PersistedState> {
        let mut tx = self.pool.begin().await?;

        let state = PersistedState {
            todos: todo::read_all(&mut tx).await?,
            pending_operations: pending::read_all(&mut tx).await?,
            conflicted_todos: conflict::read_all(&mut tx).await?,
            last_sync_at: meta::read_last_sync_at(&mut tx).await?,
            is_offline_mode: meta::read_offline_mode(&mut tx).await?,
        };

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            todos = state.todos.len(),
            pending = state.pending_operations.len(),
            conflicts = state.conflicted_todos.len(),
            "Loaded persisted state"
        );

        Ok(state)
    }

    /// Replaces the stored snapshot atomically.
    pub async fn save(&self, state: &PersistedState) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        todo::write_all(&mut tx, &state.todos).await?;
        pending::write_all(&mut tx, &state.pending_operations).await?;
        conflict::write_all(&mut tx, &state.conflicted_todos).await?;
        meta::write_scalars(&mut tx, state.last_sync_at, state.is_offline_mode).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            todos = state.todos.len(),
            pending = state.pending_operations.len(),
            "Saved persisted state"
        );

        Ok(())
    }

    /// Deletes everything the engine has stored.
    pub async fn clear(&self) -> DbResult<()> {
        self.save(&PersistedState::default()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use todo_core::{ConflictedTodo, NewTodo, PendingOperation, PersistedState, Priority, TodoPatch};

    fn sample_state() -> PersistedState {
        let a = NewTodo::new("Buy milk")
            .with_priority(Priority::High)
            .with_tags(["errands"])
            .into_todo("a".into(), "guest".into(), Utc::now());
        let b = NewTodo::new("Write report").into_todo("b".into(), "guest".into(), Utc::now());
        let mut remote_b = b.clone();
        remote_b.title = "Write the report".into();

        PersistedState {
            pending_operations: vec![
                PendingOperation::create(&a, Utc::now()),
                PendingOperation::update(&b, TodoPatch::completed(true), Utc::now()),
            ],
            conflicted_todos: vec![ConflictedTodo {
                local: b.clone(),
                remote: remote_b,
                detected_at: Utc::now(),
            }],
            todos: vec![a, b],
            last_sync_at: Some(Utc::now()),
            is_offline_mode: true,
        }
    }

    #[tokio::test]
    async fn test_empty_database_loads_default() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.state().load().await.unwrap(), PersistedState::default());
    }

    #[tokio::test]
    async fn test_save_then_load_restores_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = sample_state();

        db.state().save(&state).await.unwrap();
        assert_eq!(db.state().load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.state().save(&sample_state()).await.unwrap();

        let smaller = PersistedState {
            todos: sample_state().todos.into_iter().take(1).collect(),
            ..Default::default()
        };
        db.state().save(&smaller).await.unwrap();

        let loaded = db.state().load().await.unwrap();
        assert_eq!(loaded, smaller);
        assert!(loaded.pending_operations.is_empty());
        assert_eq!(loaded.last_sync_at, None);
    }

    #[tokio::test]
    async fn test_corrupt_queue_row_fails_load() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.state().save(&sample_state()).await.unwrap();

        sqlx::query("UPDATE pending_operations SET doc = '[]' WHERE position = 0")
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.state().load().await.unwrap_err();
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("pending_operations"));
    }

    #[tokio::test]
    async fn test_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.state().save(&sample_state()).await.unwrap();
        db.state().clear().await.unwrap();
        assert_eq!(db.state().load().await.unwrap(), PersistedState::default());
    }
}
