//! # Domain Types
//!
//! Core domain types used throughout the todo engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Todo       │   │PendingOperation │   │ ConflictedTodo  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  local: Todo    │       │
//! │  │  title          │   │  kind           │   │  remote: Todo   │       │
//! │  │  priority       │   │  todo_id (ref)  │   │  detected_at    │       │
//! │  │  completed      │   │  retry_count    │   │                 │       │
//! │  │  updated_at     │   │  base_updated_at│   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Priority     │   │   SyncStatus    │   │ConnectionStatus │       │
//! │  │  Low            │   │  Idle           │   │  Online         │       │
//! │  │  Medium         │   │  Syncing        │   │  Offline        │       │
//! │  │  High           │   │  Success/Error  │   │  Unknown        │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - `Todo.id`: UUID v4, minted on the client so an item has a stable id
//!   before the remote store ever sees it.
//! - `PendingOperation.id`: UUID v4, one per unconfirmed mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

// =============================================================================
// Priority
// =============================================================================

/// Priority of a todo item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" | "urgent" => Ok(Priority::High),
            other => Err(format!(
                "Unknown priority: '{}'. Valid options: low, medium, high",
                other
            )),
        }
    }
}

// =============================================================================
// Todo
// =============================================================================

/// A todo item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Todo {
    /// Unique identifier (UUID v4). Immutable.
    pub id: String,

    /// Short summary shown in lists.
    pub title: String,

    /// Optional longer text.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[ts(as = "Option<String>")]
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Last modification time. Server-canonical once confirmed.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Owner (signed-in user or guest identifier).
    pub user_id: String,
}

impl Todo {
    /// Returns true if the todo has a due date in the past and is still open.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Applies a patch in place and stamps `updated_at`.
    pub fn apply_patch(&mut self, patch: &TodoPatch, now: DateTime<Utc>) {
        if let Some(ref title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(ref tags) = patch.tags {
            self.tags = tags.clone();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        self.updated_at = now;
    }

    /// Returns a copy with the patch applied.
    pub fn patched(&self, patch: &TodoPatch, now: DateTime<Utc>) -> Todo {
        let mut todo = self.clone();
        todo.apply_patch(patch, now);
        todo
    }
}

// =============================================================================
// New Todo (create intent)
// =============================================================================

/// The user-supplied part of a todo, before id and timestamps exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTodo {
    /// Creates a create-intent with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        NewTodo {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Materializes the intent into a full `Todo`.
    pub fn into_todo(self, id: String, user_id: String, now: DateTime<Utc>) -> Todo {
        Todo {
            id,
            title: self.title.trim().to_string(),
            description: self.description,
            priority: self.priority,
            completed: false,
            tags: self.tags,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
            user_id,
        }
    }
}

// =============================================================================
// Todo Patch (update intent)
// =============================================================================

/// A partial update. `None` means "leave unchanged".
///
/// The nullable fields use a double `Option`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub description: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl TodoPatch {
    pub fn title(title: impl Into<String>) -> Self {
        TodoPatch {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        TodoPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        TodoPatch {
            priority: Some(priority),
            ..Default::default()
        }
    }

    /// A patch that overwrites every user-editable field with `todo`'s values.
    pub fn replace_with(todo: &Todo) -> Self {
        TodoPatch {
            title: Some(todo.title.clone()),
            description: Some(todo.description.clone()),
            priority: Some(todo.priority),
            completed: Some(todo.completed),
            tags: Some(todo.tags.clone()),
            due_date: Some(todo.due_date),
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
            && self.tags.is_none()
            && self.due_date.is_none()
    }

    /// Folds a later patch on top of this one.
    pub fn merge(&mut self, later: &TodoPatch) {
        if later.title.is_some() {
            self.title = later.title.clone();
        }
        if later.description.is_some() {
            self.description = later.description.clone();
        }
        if later.priority.is_some() {
            self.priority = later.priority;
        }
        if later.completed.is_some() {
            self.completed = later.completed;
        }
        if later.tags.is_some() {
            self.tags = later.tags.clone();
        }
        if later.due_date.is_some() {
            self.due_date = later.due_date;
        }
    }
}

// =============================================================================
// Pending Operation
// =============================================================================

/// Kind of an unconfirmed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(format!("Unknown operation kind: '{}'", other)),
        }
    }
}

/// Data needed to replay an operation against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPayload {
    /// The full todo as created locally.
    Create(Todo),
    /// The fields changed by the local edit.
    Update(TodoPatch),
}

/// A mutation applied locally but not yet acknowledged by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: OperationKind,

    pub todo_id: String,

    /// When the mutation was applied locally.
    pub timestamp: DateTime<Utc>,

    /// Failed delivery attempts so far. Never decreases.
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub payload: Option<OperationPayload>,

    /// `updated_at` of the todo the local change was based on.
    /// `None` for creates.
    #[serde(default)]
    pub base_updated_at: Option<DateTime<Utc>>,

    /// Last delivery error, if any.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl PendingOperation {
    fn new(
        kind: OperationKind,
        todo_id: &str,
        payload: Option<OperationPayload>,
        base_updated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        PendingOperation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            todo_id: todo_id.to_string(),
            timestamp: now,
            retry_count: 0,
            payload,
            base_updated_at,
            last_error: None,
        }
    }

    /// Queue entry for an optimistically created todo.
    pub fn create(todo: &Todo, now: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Create,
            &todo.id,
            Some(OperationPayload::Create(todo.clone())),
            None,
            now,
        )
    }

    /// Queue entry for an edit of `base` (the version before the edit).
    pub fn update(base: &Todo, patch: TodoPatch, now: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Update,
            &base.id,
            Some(OperationPayload::Update(patch)),
            Some(base.updated_at),
            now,
        )
    }

    /// Queue entry for the removal of `base`.
    pub fn delete(base: &Todo, now: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Delete,
            &base.id,
            None,
            Some(base.updated_at),
            now,
        )
    }

    /// The patch carried by an update operation.
    pub fn patch(&self) -> Option<&TodoPatch> {
        match self.payload {
            Some(OperationPayload::Update(ref patch)) => Some(patch),
            _ => None,
        }
    }

    /// The todo carried by a create operation.
    pub fn created_todo(&self) -> Option<&Todo> {
        match self.payload {
            Some(OperationPayload::Create(ref todo)) => Some(todo),
            _ => None,
        }
    }
}

// =============================================================================
// Conflicts
// =============================================================================

/// A todo whose local and remote versions diverged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictedTodo {
    /// The local version (including unconfirmed edits).
    pub local: Todo,
    /// The remote version observed during reconciliation.
    pub remote: Todo,
    pub detected_at: DateTime<Utc>,
}

impl ConflictedTodo {
    pub fn todo_id(&self) -> &str {
        &self.local.id
    }
}

// =============================================================================
// Statuses
// =============================================================================

/// Status of the most recent reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Network reachability as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl ConnectionStatus {
    /// Whether remote calls are worth attempting.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ConnectionStatus::Offline)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Online => write!(f, "online"),
            ConnectionStatus::Offline => write!(f, "offline"),
            ConnectionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
