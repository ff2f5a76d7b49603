//! # Todos Table
//!
//! The persisted todo list, in display order.

use sqlx::SqliteConnection;

use super::{decode, encode};
use crate::error::DbResult;
use todo_core::Todo;

const TABLE: &str = "todos";

pub(crate) async fn read_all(conn: &mut SqliteConnection) -> DbResult<Vec<Todo>> {
    let rows = sqlx::query("SELECT doc FROM todos ORDER BY position ASC")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(|row| decode(TABLE, row)).collect()
}

pub(crate) async fn write_all(conn: &mut SqliteConnection, todos: &[Todo]) -> DbResult<()> {
    sqlx::query("DELETE FROM todos").execute(&mut *conn).await?;

    for (position, todo) in todos.iter().enumerate() {
        let doc = encode(TABLE, todo)?;
        sqlx::query(
            r#"
            INSERT INTO todos (id, position, user_id, completed, updated_at, doc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&todo.id)
        .bind(position as i64)
        .bind(&todo.user_id)
        .bind(todo.completed)
        .bind(todo.updated_at.to_rfc3339())
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
    use todo_core::NewTodo;

    fn todo(id: &str, title: &str) -> Todo {
        NewTodo::new(title).into_todo(id.to_string(), "guest".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_write_all_replaces_and_keeps_given_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        write_all(&mut conn, &[todo("old", "gone")]).await.unwrap();
        write_all(&mut conn, &[todo("z", "z"), todo("a", "a"), todo("m", "m")])
            .await
            .unwrap();

        let ids: Vec<String> = read_all(&mut conn)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_undecodable_row_is_corrupt() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO todos (id, position, user_id, completed, updated_at, doc) \
             VALUES ('x', 0, 'guest', 0, '', '{not json')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = read_all(&mut conn).await.unwrap_err();
        assert!(err.is_corrupt());
    }
}
