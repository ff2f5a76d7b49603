//! # Sync Metadata Table
//!
//! Key/value storage for the scalar parts of the persisted state.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};

const TABLE: &str = "sync_meta";

/// Key for the time of the last successful reconciliation (RFC 3339).
pub const LAST_SYNC_AT: &str = "last_sync_at";

/// Key for the sticky offline-mode flag ("true" / "false").
pub const OFFLINE_MODE: &str = "is_offline_mode";

pub(crate) async fn get_in(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

pub(crate) async fn set_in(conn: &mut SqliteConnection, key: &str, value: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn read_last_sync_at(
    conn: &mut SqliteConnection,
) -> DbResult<Option<DateTime<Utc>>> {
    match get_in(conn, LAST_SYNC_AT).await? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| DbError::corrupt(TABLE, format!("{}: {}", LAST_SYNC_AT, e))),
    }
}

pub(crate) async fn read_offline_mode(conn: &mut SqliteConnection) -> DbResult<bool> {
    match get_in(conn, OFFLINE_MODE).await?.as_deref() {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(DbError::corrupt(
            TABLE,
            format!("{}: unexpected value '{}'", OFFLINE_MODE, other),
        )),
    }
}

pub(crate) async fn write_scalars(
    conn: &mut SqliteConnection,
    last_sync_at: Option<DateTime<Utc>>,
    is_offline_mode: bool,
) -> DbResult<()> {
    match last_sync_at {
        Some(at) => set_in(conn, LAST_SYNC_AT, &at.to_rfc3339()).await?,
        None => {
            sqlx::query("DELETE FROM sync_meta WHERE key = ?1")
                .bind(LAST_SYNC_AT)
                .execute(&mut *conn)
                .await?;
        }
    }
    set_in(conn, OFFLINE_MODE, if is_offline_mode { "true" } else { "false" }).await
}
