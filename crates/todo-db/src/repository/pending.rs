//! # Pending Operations Table
//!
//! The durable copy of the FIFO queue of unconfirmed mutations.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  position 0   create  todo-1      ← replayed first                     │
//! │  position 1   update  todo-1                                           │
//! │  position 2   delete  todo-7                                           │
//! │  …                                                                      │
//! │                                                                         │
//! │  `position` is the queue index at save time. Load returns rows         │
//! │  ORDER BY position, so replay order survives a restart.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;

use super::{decode, encode};
use crate::error::DbResult;
use todo_core::PendingOperation;

const TABLE: &str = "pending_operations";

pub(crate) async fn read_all(conn: &mut SqliteConnection) -> DbResult<Vec<PendingOperation>> {
    let rows = sqlx::query("SELECT doc FROM pending_operations ORDER BY position ASC")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(|row| decode(TABLE, row)).collect()
}

pub(crate) async fn write_all(
    conn: &mut SqliteConnection,
    ops: &[PendingOperation],
) -> DbResult<()> {
    sqlx::query("DELETE FROM pending_operations")
        .execute(&mut *conn)
        .await?;

    for (position, op) in ops.iter().enumerate() {
        let doc = encode(TABLE, op)?;
        sqlx::query(
            r#"
            INSERT INTO pending_operations (id, position, todo_id, kind, retry_count, doc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&op.id)
        .bind(position as i64)
        .bind(&op.todo_id)
        .bind(op.kind.to_string())
        .bind(op.retry_count as i64)
        .bind(doc)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use todo_core::{NewTodo, Todo, TodoPatch};

    fn todo(id: &str) -> Todo {
        NewTodo::new("queued").into_todo(id.to_string(), "guest".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_queue_order_and_retry_state_survive_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let create = PendingOperation::create(&todo("a"), Utc::now());
        let update = PendingOperation::update(&todo("a"), TodoPatch::completed(true), Utc::now());
        let mut delete = PendingOperation::delete(&todo("b"), Utc::now());
        delete.retry_count = 2;
        delete.last_error = Some("timeout".into());

        let queue = vec![delete, create, update];
        write_all(&mut conn, &queue).await.unwrap();
        assert_eq!(read_all(&mut conn).await.unwrap(), queue);

        write_all(&mut conn, &[]).await.unwrap();
        assert!(read_all(&mut conn).await.unwrap().is_empty());
    }
}
