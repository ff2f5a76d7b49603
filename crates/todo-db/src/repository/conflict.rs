//! # Conflicted Todos Table
//!
//! Conflict records awaiting resolution. At most one per todo id.

use sqlx::SqliteConnection;

use super::{decode, encode};
use crate::error::DbResult;
use todo_core::ConflictedTodo;

const TABLE: &str = "conflicted_todos";

pub(crate) async fn read_all(conn: &mut SqliteConnection) -> DbResult<Vec<ConflictedTodo>> {
    let rows = sqlx::query("SELECT doc FROM conflicted_todos ORDER BY position ASC")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(|row| decode(TABLE, row)).collect()
}

pub(crate) async fn write_all(
    conn: &mut SqliteConnection,
    conflicts: &[ConflictedTodo],
) -> DbResult<()> {
    sqlx::query("DELETE FROM conflicted_todos")
        .execute(&mut *conn)
        .await?;

    for (position, conflict) in conflicts.iter().enumerate() {
        let doc = encode(TABLE, conflict)?;
        // A later record for the same todo replaces the earlier one
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO conflicted_todos (todo_id, position, detected_at, doc)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(conflict.todo_id())
        .bind(position as i64)
        .bind(conflict.detected_at.to_rfc3339())
        .bind(doc)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
