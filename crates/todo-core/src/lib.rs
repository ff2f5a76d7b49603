//! # todo-core: Pure Sync State Machine
//!
//! This crate is the **heart** of the todo engine. It contains the data model,
//! validation rules and the reducer as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Todo Engine Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Caller / UI layer                            │   │
//! │  │    add_todo ──► toggle_todo ──► trigger_sync ──► stats          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ intents                                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               todo-sync (coordinator, orchestrator)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ TodoAction                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ todo-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  action   │  │  reducer  │  │ validation│  │   │
//! │  │   │   Todo    │  │ TodoAction│  │  reduce() │  │   rules   │  │   │
//! │  │   │ PendingOp │  │           │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • SINGLE WRITER            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Todo, PendingOperation, statuses)
//! - [`action`] - Every transition the reducer accepts
//! - [`state`] - The `TodoState` aggregate and derived metadata
//! - [`reducer`] - The single authorized mutator of `TodoState`
//! - [`filter`] - View filters (and the legacy plain-object adapter)
//! - [`error`] - Domain error types
//! - [`validation`] - Intent validation
//!
//! ## Example Usage
//!
//! ```rust
//! use todo_core::action::TodoAction;
//! use todo_core::reducer::reduce;
//! use todo_core::state::TodoState;
//! use todo_core::types::{NewTodo, Priority};
//!
//! let state = reduce(
//!     TodoState::default(),
//!     TodoAction::AddTodo {
//!         input: NewTodo::new("Buy milk").with_priority(Priority::Medium),
//!         user_id: "guest".to_string(),
//!     },
//! );
//!
//! assert_eq!(state.todos.len(), 1);
//! assert!(!state.todos[0].completed);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod error;
pub mod filter;
pub mod reducer;
pub mod state;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use action::TodoAction;
pub use error::{CoreError, CoreResult, TodoPermission, ValidationError};
pub use filter::{LegacyFilter, StatusFilter, TodoFilter};
pub use reducer::{next_timestamp, reduce};
pub use state::{PersistedState, TodoState, TodoStats};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// User id stamped on todos created without a signed-in session.
pub const GUEST_USER_ID: &str = "guest";

/// Default number of retries before a pending operation is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Maximum number of tags on a single todo.
pub const MAX_TAGS: usize = 20;

/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 50;
