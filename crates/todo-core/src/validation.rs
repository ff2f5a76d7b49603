//! # Validation Module
//!
//! Intent validation for the todo engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Where Validation Happens                           │
//! │                                                                         │
//! │  Caller intent (add_todo / update_todo)                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Permission check (auth context)                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  THIS MODULE: field rules                                              │
//! │           │                                                             │
//! │           ├── Err → returned to caller, state untouched                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Optimistic action + pending operation                                 │
//! │                                                                         │
//! │  The reducer itself never validates: it trusts its callers.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{NewTodo, TodoPatch};
use crate::{MAX_DESCRIPTION_LEN, MAX_TAGS, MAX_TAG_LEN, MAX_TITLE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a todo title.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_TITLE_LEN` characters
///
/// ## Example
/// ```rust
/// use todo_core::validation::validate_title;
///
/// assert!(validate_title("Buy milk").is_ok());
/// assert!(validate_title("   ").is_err());
/// ```
pub fn validate_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    Ok(())
}

/// Validates an optional description.
pub fn validate_description(description: Option<&str>) -> ValidationResult<()> {
    match description {
        Some(text) if text.chars().count() > MAX_DESCRIPTION_LEN => {
            Err(ValidationError::TooLong {
                field: "description".to_string(),
                max: MAX_DESCRIPTION_LEN,
            })
        }
        _ => Ok(()),
    }
}

/// Validates a tag list.
///
/// ## Rules
/// - At most `MAX_TAGS` tags
/// - Each tag non-empty, no whitespace, at most `MAX_TAG_LEN` characters
/// - No duplicates (case-insensitive)
pub fn validate_tags(tags: &[String]) -> ValidationResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::TooMany {
            field: "tags".to_string(),
            max: MAX_TAGS,
        });
    }

    let mut seen = HashSet::new();
    for tag in tags {
        if tag.is_empty() {
            return Err(ValidationError::Required {
                field: "tag".to_string(),
            });
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(ValidationError::TooLong {
                field: "tag".to_string(),
                max: MAX_TAG_LEN,
            });
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "tag".to_string(),
                reason: "must not contain whitespace".to_string(),
            });
        }
        if !seen.insert(tag.to_lowercase()) {
            return Err(ValidationError::Duplicate {
                field: "tag".to_string(),
                value: tag.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Intent Validators
// =============================================================================

/// Validates a create intent.
pub fn validate_new_todo(input: &NewTodo) -> ValidationResult<()> {
    validate_title(&input.title)?;
    validate_description(input.description.as_deref())?;
    validate_tags(&input.tags)?;
    Ok(())
}

/// Validates an update intent.
///
/// ## Rules
/// - The patch must change at least one field
/// - Every present field follows the create rules
pub fn validate_patch(patch: &TodoPatch) -> ValidationResult<()> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }

    if let Some(ref title) = patch.title {
        validate_title(title)?;
    }
    if let Some(ref description) = patch.description {
        validate_description(description.as_deref())?;
    }
    if let Some(ref tags) = patch.tags {
        validate_tags(tags)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
