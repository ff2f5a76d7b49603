//! # Error Types
//!
//! Domain-specific error types for todo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  todo-core errors (this file)                                          │
//! │  ├── CoreError        - Rejected intents (sync, before any mutation)   │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  todo-db errors (separate crate)                                       │
//! │  └── DbError          - Local persistence failures (tolerated)         │
//! │                                                                         │
//! │  todo-sync errors (separate crate)                                     │
//! │  ├── RemoteError      - Remote API failures (retried)                  │
//! │  └── SyncError        - Engine level failures                          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → caller (synchronously)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, id, action)
//! 3. Errors are enum variants, never String
//! 4. The reducer never returns errors; only intent checks do

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Permission
// =============================================================================

/// A mutation the auth context may allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPermission {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for TodoPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoPermission::Create => write!(f, "create"),
            TodoPermission::Update => write!(f, "update"),
            TodoPermission::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Errors returned synchronously when an intent is rejected.
///
/// None of these leave a trace in `TodoState`: they are raised before the
/// optimistic mutation and before any pending operation is queued.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The intent failed input validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The auth context does not allow this mutation.
    ///
    /// ## When This Occurs
    /// - Guest sessions with creation disabled
    /// - Read-only shared lists
    #[error("Permission denied: cannot {action} todos")]
    PermissionDenied { action: TodoPermission },

    /// The intent targets a todo that is not in local state.
    #[error("Todo not found: {0}")]
    TodoNotFound(String),

    /// The todo is parked in the conflict list and must be resolved first.
    #[error("Todo {0} has an unresolved conflict")]
    TodoInConflict(String),
}

impl CoreError {
    /// Returns true for the error kinds that come from the auth context.
    pub fn is_permission_error(&self) -> bool {
        matches!(self, CoreError::PermissionDenied { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Collection has too many entries.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },

    /// Invalid format (e.g., tag with whitespace).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same tag twice).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// An update that would change nothing.
    #[error("update must change at least one field")]
    EmptyPatch,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
