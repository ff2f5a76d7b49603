//! # View Filters
//!
//! Which todos the caller wants to see. Filtering is view state only: it is
//! stored in `TodoState` so every reader agrees on it, but it never touches
//! the queue or the todo list itself.
//!
//! Older callers pass a loosely typed plain object (`LegacyFilter`); it is
//! converted once at the boundary into the typed `TodoFilter`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Priority, Todo};

/// Completion-state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// The active view filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TodoFilter {
    #[serde(default)]
    pub status: StatusFilter,

    /// Only todos with this priority.
    #[serde(default)]
    pub priority: Option<Priority>,

    /// Case-insensitive substring over title and description.
    #[serde(default)]
    pub search: Option<String>,

    /// Only todos carrying this tag (case-insensitive).
    #[serde(default)]
    pub tag: Option<String>,
}

impl TodoFilter {
    pub fn status(status: StatusFilter) -> Self {
        TodoFilter {
            status,
            ..Default::default()
        }
    }

    /// Returns true if the filter lets every todo through.
    pub fn is_empty(&self) -> bool {
        self.status == StatusFilter::All
            && self.priority.is_none()
            && self.search.as_deref().map(str::trim).unwrap_or("").is_empty()
            && self.tag.is_none()
    }

    pub fn matches(&self, todo: &Todo) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => !todo.completed,
            StatusFilter::Completed => todo.completed,
        };
        if !status_ok {
            return false;
        }

        if let Some(priority) = self.priority {
            if todo.priority != priority {
                return false;
            }
        }

        if let Some(ref tag) = self.tag {
            if !todo.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                todo.title.to_lowercase().contains(&term)
                    || todo
                        .description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&term))
                        .unwrap_or(false)
            }
            _ => true,
        }
    }
}

// =============================================================================
// Legacy Adapter
// =============================================================================

/// The plain-object filter shape older callers send.
///
/// ```json
/// { "status": "active", "priority": "all", "searchTerm": "milk" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub search_term: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl From<LegacyFilter> for TodoFilter {
    fn from(legacy: LegacyFilter) -> Self {
        let status = match legacy.status.as_deref().map(str::to_lowercase).as_deref() {
            Some("active") | Some("pending") => StatusFilter::Active,
            Some("completed") | Some("done") => StatusFilter::Completed,
            _ => StatusFilter::All,
        };

        // "all" and unknown values both mean "no priority filter"
        let priority = legacy.priority.as_deref().and_then(|p| p.parse().ok());

        TodoFilter {
            status,
            priority,
            search: legacy.search_term.filter(|s| !s.trim().is_empty()),
            tag: legacy.tag.filter(|t| !t.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTodo;
    use chrono::Utc;

    fn todo(title: &str, priority: Priority, completed: bool) -> Todo {
        let mut todo = NewTodo::new(title)
            .with_priority(priority)
            .with_tags(["home"])
            .into_todo(title.to_string(), "guest".into(), Utc::now());
        todo.completed = completed;
        todo
    }

    #[test]
    fn test_default_filter_matches_everything() {
        let filter = TodoFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&todo("a", Priority::Low, true)));
        assert!(filter.matches(&todo("b", Priority::High, false)));
    }

    #[test]
    fn test_status_priority_and_search() {
        let filter = TodoFilter {
            status: StatusFilter::Active,
            priority: Some(Priority::High),
            search: Some("MILK".into()),
            tag: None,
        };
        assert!(filter.matches(&todo("Buy milk", Priority::High, false)));
        assert!(!filter.matches(&todo("Buy milk", Priority::High, true)));
        assert!(!filter.matches(&todo("Buy milk", Priority::Low, false)));
        assert!(!filter.matches(&todo("Buy bread", Priority::High, false)));
    }

    #[test]
    fn test_tag_filter_is_case_insensitive() {
        let filter = TodoFilter {
            tag: Some("HOME".into()),
            ..Default::default()
        };
        assert!(filter.matches(&todo("a", Priority::Low, false)));

        let filter = TodoFilter {
            tag: Some("work".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&todo("a", Priority::Low, false)));
    }

    #[test]
    fn test_legacy_filter_conversion() {
        let legacy: LegacyFilter = serde_json::from_str(
            r#"{"status": "completed", "priority": "all", "searchTerm": "  "}"#,
        )
        .unwrap();
        let filter = TodoFilter::from(legacy);
        assert_eq!(filter.status, StatusFilter::Completed);
        assert_eq!(filter.priority, None);
        assert_eq!(filter.search, None);

        let legacy: LegacyFilter =
            serde_json::from_str(r#"{"status": "active", "priority": "high"}"#).unwrap();
        let filter = TodoFilter::from(legacy);
        assert_eq!(filter.status, StatusFilter::Active);
        assert_eq!(filter.priority, Some(Priority::High));
    }
}
