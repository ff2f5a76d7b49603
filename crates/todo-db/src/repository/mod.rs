//! # Repository Module
//!
//! Access to the local store. Callers go through [`StateRepository`](state::StateRepository),
//! which reads and writes the per-table modules inside one transaction.
//!
//! ## Row Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every table stores the full record as JSON in `doc`, next to the      │
//! │  handful of columns needed for ordering and lookups.                   │
//! │                                                                         │
//! │  todos               id │ position │ user_id │ completed │ … │ doc      │
//! │  pending_operations  id │ position │ todo_id │ kind      │ … │ doc      │
//! │  conflicted_todos    todo_id │ position │ detected_at      │ doc      │
//! │  sync_meta           key │ value                                       │
//! │                                                                         │
//! │  Load decodes `doc` only. A row whose `doc` does not decode is         │
//! │  reported as DbError::Corrupt naming its table.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tables
//!
//! - `todo` - the todo list
//! - `pending` - the FIFO queue
//! - `conflict` - conflict records
//! - `meta` - scalar sync fields

pub(crate) mod conflict;
pub(crate) mod meta;
pub(crate) mod pending;
pub mod state;
pub(crate) mod todo;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{DbError, DbResult};

/// Serializes a record into its `doc` column.
pub(crate) fn encode<T: Serialize>(table: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::Encode {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

/// Decodes the `doc` column of a row.
pub(crate) fn decode<T: DeserializeOwned>(table: &str, row: &SqliteRow) -> DbResult<T> {
    let doc: String = row
        .try_get("doc")
        .map_err(|e| DbError::corrupt(table, e))?;
    serde_json::from_str(&doc).map_err(|e| DbError::corrupt(table, e))
}
