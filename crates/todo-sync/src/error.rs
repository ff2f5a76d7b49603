//! # Sync Error Types
//!
//! Error types for the sync engine and its remote collaborator.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Intent      │  │     Remote              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Rejected       │  │  Network / Timeout      │ │
//! │  │  ConfigLoad…    │  │  (validation,   │  │  Rejected { status }    │ │
//! │  │  ConfigSave…    │  │   permission)   │  │  NotFound / Conflict    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │   Sync pass     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Storage        │  │  Offline        │  │  ChannelError           │ │
//! │  │  (tolerated,    │  │  AlreadySyncing │  │  ShuttingDown           │ │
//! │  │   never fatal)  │  │  Cancelled      │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Intent errors are returned synchronously. Remote errors are retried   │
//! │  and end up in `TodoState::sync_errors`. Storage errors are logged.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use todo_core::{CoreError, Todo};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote Error
// =============================================================================

/// Failure reported by the remote todo API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The request never reached the remote store.
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting for a response.
    #[error("Request timed out")]
    Timeout,

    /// The remote store refused the request.
    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The todo does not exist remotely.
    #[error("Todo not found on remote: {0}")]
    NotFound(String),

    /// The remote version moved on since the local change was made.
    #[error("Remote version of {} changed", current.id)]
    Conflict { current: Box<Todo> },
}

impl RemoteError {
    /// Returns true if the same request may succeed later.
    ///
    /// ## Retryable
    /// - Network failures and timeouts
    /// - Server-side (5xx) and throttling (429) rejections
    ///
    /// ## Not Retryable
    /// - Client-side rejections (4xx)
    /// - NotFound and Conflict, which need a different resolution
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 429,
            RemoteError::NotFound(_) | RemoteError::Conflict { .. } => false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        RemoteError::Network(message.into())
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Engine-level error.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Intent Errors
    // =========================================================================
    /// The intent was rejected before any state change.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// A remote call failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An operation was abandoned after exhausting its retries.
    #[error("Gave up on operation {operation_id} after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        operation_id: String,
        attempts: u32,
        last_error: String,
    },

    // =========================================================================
    // Sync Pass Errors
    // =========================================================================
    /// The connection is offline; remote calls were not attempted.
    #[error("Connection is offline")]
    Offline,

    /// Another sync pass is already running.
    #[error("A sync pass is already in progress")]
    AlreadySyncing,

    /// The sync pass was cancelled between steps.
    #[error("Sync cancelled")]
    Cancelled,

    /// A resolution was requested for a todo that has no conflict record.
    #[error("Todo {0} is not in conflict")]
    NotInConflict(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<todo_db::DbError> for SyncError {
    fn from(err: todo_db::DbError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failed call may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(remote) => remote.is_retryable(),
            SyncError::Offline | SyncError::AlreadySyncing => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the caller's intent was rejected up front.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use todo_core::{NewTodo, TodoPermission, ValidationError};

    #[test]
    fn test_remote_retryable() {
        assert!(RemoteError::network("connection reset").is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::rejected(503, "unavailable").is_retryable());
        assert!(RemoteError::rejected(429, "slow down").is_retryable());

        assert!(!RemoteError::rejected(400, "bad request").is_retryable());
        assert!(!RemoteError::NotFound("x".into()).is_retryable());

        let current = NewTodo::new("x").into_todo("t-1".into(), "guest".into(), Utc::now());
        let conflict = RemoteError::Conflict {
            current: Box::new(current),
        };
        assert!(!conflict.is_retryable());
        assert_eq!(conflict.to_string(), "Remote version of t-1 changed");
    }

    #[test]
    fn test_sync_error_categories() {
        assert!(SyncError::from(RemoteError::Timeout).is_retryable());
        assert!(SyncError::Offline.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());

        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(!SyncError::Offline.is_config_error());

        let rejected = SyncError::from(CoreError::PermissionDenied {
            action: TodoPermission::Delete,
        });
        assert!(rejected.is_rejection());
        assert_eq!(rejected.to_string(), "Permission denied: cannot delete todos");
    }

    #[test]
    fn test_validation_error_is_transparent() {
        let err = SyncError::from(CoreError::from(ValidationError::EmptyPatch));
        assert!(err.to_string().starts_with("Validation error"));
    }
}
