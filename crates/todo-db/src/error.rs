//! # Database Error Types
//!
//! Error types for local store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      Undecodable row (serde_json)          │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError::Storage (todo-sync)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Hydration falls back to an empty state, saves are logged and retried  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Local store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A stored row could not be decoded.
    ///
    /// ## When This Occurs
    /// - The JSON document was written by an incompatible version
    /// - The file was edited or truncated outside the engine
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: String, reason: String },

    /// A record could not be encoded for storage.
    #[error("Failed to encode {table} row: {reason}")]
    Encode { table: String, reason: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a Corrupt error for a row in `table`.
    pub fn corrupt(table: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Corrupt {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the stored data itself is unreadable.
    ///
    /// Callers treat this as "start from empty" rather than "try again".
    pub fn is_corrupt(&self) -> bool {
        matches!(self, DbError::Corrupt { .. })
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::PoolExhausted | DbError::ConnectionFailed(_) | DbError::TransactionFailed(_)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::ColumnDecode   → DbError::Corrupt
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),

            sqlx::Error::ColumnDecode { index, source } => DbError::Corrupt {
                table: "unknown".to_string(),
                reason: format!("column {}: {}", index, source),
            },

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
