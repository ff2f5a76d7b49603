//! # todo-db: Local Durable Store
//!
//! Persists the sync engine's state in a local SQLite file so todos, queued
//! mutations and conflicts survive a restart.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Todo Sync Data Flow                              │
//! │                                                                         │
//! │  todo-sync (engine start, persistence worker)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     todo-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ StateRepo     │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│  todos        │    │              │  │   │
//! │  │   │               │    │  pending ops  │    │              │  │   │
//! │  │   │               │    │  conflicts    │    │              │  │   │
//! │  │   │               │    │  sync_meta    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/todos.db                                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use todo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("todos.db")).await?;
//! let persisted = db.state().load().await?;
//! db.state().save(&persisted).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::state::StateRepository;
