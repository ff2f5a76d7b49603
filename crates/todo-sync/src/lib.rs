//! # todo-sync: Optimistic Updates and Reconciliation
//!
//! This crate turns the pure state machine in `todo-core` into a running
//! engine: intents are applied locally at once, delivered to the remote store
//! in the background, and reconciled with the remote list on reconnect.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Todo Sync Engine                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      TodoEngine (facade)                         │  │
//! │  │  Built by TodoEngineBuilder, spawns the background tasks         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  Coordinator   │  │SyncOrchestrator│  │  ConflictResolver      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Optimistic     │  │ Replay queue,  │  │ keep local / keep      │    │
//! │  │ dispatch, per- │  │ fetch list,    │  │ remote / manual merge  │    │
//! │  │ id FIFO, retry │  │ merge/conflict │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   TodoStore    │  │ Connection     │  │  PersistenceWorker     │    │
//! │  │                │  │ Monitor/Pinger │  │                        │    │
//! │  │ Sole owner of  │  │ Online/offline │  │ Debounced snapshot     │    │
//! │  │ TodoState      │  │ transitions    │  │ saves to todo-db       │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  SEAMS (traits):                                                       │
//! │  • RemoteTodoApi  - create / update / delete / list                    │
//! │  • AuthContext    - acting user id and create/update/delete flags      │
//! │  • StateStorage   - load / save of the persisted state                 │
//! │  • ConflictPolicy - bulk conflict decisions                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `TodoEngine` facade and builder
//! - [`coordinator`] - Intent pipeline and mutation tickets
//! - [`orchestrator`] - Sync passes and the reconnect/interval scheduler
//! - [`resolver`] - Conflict resolution strategies
//! - [`connection`] - Connection monitor and pinger
//! - [`persistence`] - Hydration and the persistence worker
//! - [`store`] - State container around the reducer
//! - [`sequencer`] - Per-todo FIFO execution
//! - [`remote`] - Remote API trait and in-memory implementation
//! - [`retry`] - Retry policy
//! - [`auth`] - Auth context
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod engine;
pub mod error;
mod executor;
pub mod orchestrator;
pub mod persistence;
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod sequencer;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthContext, StaticAuth};
pub use config::{EngineConfig, RetryStrategyKind, StorageSettings, SyncSettings, UserConfig};
pub use connection::{ConnectionMonitor, ConnectionPinger, ConnectionPingerHandle, Transition};
pub use coordinator::{Coordinator, MutationOutcome, MutationTicket};
pub use engine::{TodoEngine, TodoEngineBuilder};
pub use error::{RemoteError, SyncError, SyncResult};
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncScheduler, SyncSchedulerHandle, SyncTriggers};
pub use persistence::{hydrate, MemoryStorage, PersistenceHandle, PersistenceWorker, StateStorage};
pub use remote::{InMemoryTodoApi, RemoteCall, RemoteTodoApi};
pub use resolver::{ConflictPolicy, ConflictResolver, ConflictStrategy, NewestWins};
pub use retry::{RetryPolicy, RetryStrategy};
pub use sequencer::OperationSequencer;
pub use store::TodoStore;
