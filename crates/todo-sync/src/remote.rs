//! # Remote Todo API
//!
//! The remote source of truth as the engine sees it, plus an in-memory
//! implementation used by tests and local development.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RemoteTodoApi                                                          │
//! │    create(todo)       -> Todo        server may restamp updated_at     │
//! │    update(id, patch, base) -> Todo                                     │
//! │    delete(id, base)   -> ()                                            │
//! │    list()             -> Vec<Todo>   canonical list                    │
//! │    ping()             -> ()          reachability check                │
//! │                                                                         │
//! │  `base` is the `updated_at` the local change was made against. When   │
//! │  it is set and the stored version differs, the write is refused with  │
//! │  `RemoteError::Conflict` carrying the current version.                │
//! │                                                                         │
//! │  Failures are typed (`RemoteError`); the coordinator decides whether   │
//! │  to retry, abandon or raise a conflict.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RemoteError;
use todo_core::{Todo, TodoPatch};

// =============================================================================
// Remote API Trait
// =============================================================================

/// Operations the remote todo store must expose.
#[async_trait]
pub trait RemoteTodoApi: Send + Sync {
    async fn create(&self, todo: &Todo) -> Result<Todo, RemoteError>;

    /// Applies `patch` if the stored version still matches `base`.
    async fn update(
        &self,
        id: &str,
        patch: &TodoPatch,
        base: Option<DateTime<Utc>>,
    ) -> Result<Todo, RemoteError>;

    /// Deletes the todo if the stored version still matches `base`.
    async fn delete(&self, id: &str, base: Option<DateTime<Utc>>) -> Result<(), RemoteError>;

    async fn list(&self) -> Result<Vec<Todo>, RemoteError>;

    /// Cheap reachability check. Defaults to a full `list`.
    async fn ping(&self) -> Result<(), RemoteError> {
        self.list().await.map(|_| ())
    }
}

// =============================================================================
// In-Memory Remote
// =============================================================================

/// One call received by [`InMemoryTodoApi`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(String),
    Update(String),
    Delete(String),
    List,
    Ping,
}

#[derive(Debug, Default)]
struct Inner {
    todos: Vec<Todo>,
    failures: VecDeque<RemoteError>,
    offline: bool,
    latency: Duration,
    calls: Vec<RemoteCall>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Server clock: strictly increasing so every write gets a new version.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.todos.iter().position(|t| t.id == id)
    }

    /// Index of `id`, checking the caller's base version against the stored one.
    fn writable(&self, id: &str, base: Option<DateTime<Utc>>) -> Result<usize, RemoteError> {
        let index = self
            .position(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        let stored = &self.todos[index];
        match base {
            Some(base) if base != stored.updated_at => Err(RemoteError::Conflict {
                current: Box::new(stored.clone()),
            }),
            _ => Ok(index),
        }
    }
}

/// A remote store that lives in memory.
///
/// ## Failure injection
/// - [`fail_next`](Self::fail_next): the next `n` calls fail with a network error
/// - [`inject`](Self::inject): the next call fails with a specific error
/// - [`set_offline`](Self::set_offline): every call fails until switched back
///
/// ## External edits
/// [`put`](Self::put) and [`remove`](Self::remove) change the remote list the
/// way another device would, bumping `updated_at`.
#[derive(Debug, Default)]
pub struct InMemoryTodoApi {
    inner: Mutex<Inner>,
}

impl InMemoryTodoApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `todos` already stored remotely.
    pub fn with_todos(todos: Vec<Todo>) -> Self {
        InMemoryTodoApi {
            inner: Mutex::new(Inner {
                todos,
                ..Default::default()
            }),
        }
    }

    pub async fn fail_next(&self, n: usize) {
        let mut inner = self.inner.lock().await;
        for _ in 0..n {
            inner
                .failures
                .push_back(RemoteError::network("injected failure"));
        }
    }

    pub async fn inject(&self, error: RemoteError) {
        self.inner.lock().await.failures.push_back(error);
    }

    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// Delay applied to every call.
    pub async fn set_latency(&self, latency: Duration) {
        self.inner.lock().await.latency = latency;
    }

    /// Inserts or replaces a todo as another client would, returning the stored version.
    pub async fn put(&self, mut todo: Todo) -> Todo {
        let mut inner = self.inner.lock().await;
        todo.updated_at = inner.stamp();
        match inner.position(&todo.id) {
            Some(index) => inner.todos[index] = todo.clone(),
            None => inner.todos.push(todo.clone()),
        }
        todo
    }

    /// Edits a stored todo as another client would.
    pub async fn edit(&self, id: &str, patch: &TodoPatch) -> Option<Todo> {
        let mut inner = self.inner.lock().await;
        let index = inner.position(id)?;
        let stamp = inner.stamp();
        inner.todos[index].apply_patch(patch, stamp);
        Some(inner.todos[index].clone())
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.position(id) {
            Some(index) => {
                inner.todos.remove(index);
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<Todo> {
        let inner = self.inner.lock().await;
        inner.position(id).map(|index| inner.todos[index].clone())
    }

    pub async fn snapshot(&self) -> Vec<Todo> {
        self.inner.lock().await.todos.clone()
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Records the call, applies latency and pops an injected failure.
    async fn begin(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let latency = {
            let mut inner = self.inner.lock().await;
            debug!(?call, "In-memory remote call");
            inner.calls.push(call);
            inner.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock().await;
        if inner.offline {
            return Err(RemoteError::network("remote unreachable"));
        }
        match inner.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteTodoApi for InMemoryTodoApi {
    async fn create(&self, todo: &Todo) -> Result<Todo, RemoteError> {
        self.begin(RemoteCall::Create(todo.id.clone())).await?;

        let mut inner = self.inner.lock().await;
        // Client-minted ids make create idempotent
        if let Some(index) = inner.position(&todo.id) {
            return Ok(inner.todos[index].clone());
        }

        let mut stored = todo.clone();
        stored.updated_at = inner.stamp();
        inner.todos.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: &str,
        patch: &TodoPatch,
        base: Option<DateTime<Utc>>,
    ) -> Result<Todo, RemoteError> {
        self.begin(RemoteCall::Update(id.to_string())).await?;

        let mut inner = self.inner.lock().await;
        let index = inner.writable(id, base)?;
        let stamp = inner.stamp();
        inner.todos[index].apply_patch(patch, stamp);
        Ok(inner.todos[index].clone())
    }

    async fn delete(&self, id: &str, base: Option<DateTime<Utc>>) -> Result<(), RemoteError> {
        self.begin(RemoteCall::Delete(id.to_string())).await?;

        let mut inner = self.inner.lock().await;
        let index = inner.writable(id, base)?;
        inner.todos.remove(index);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Todo>, RemoteError> {
        // Read at arrival; latency models the response on its way back
        let todos = self.inner.lock().await.todos.clone();
        self.begin(RemoteCall::List).await?;
        Ok(todos)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.begin(RemoteCall::Ping).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_core::NewTodo;

    fn todo(id: &str, title: &str) -> Todo {
        NewTodo::new(title).into_todo(id.into(), "guest".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_restamps_and_is_idempotent() {
        let api = InMemoryTodoApi::new();
        let local = todo("a", "Buy milk");

        let stored = api.create(&local).await.unwrap();
        assert_eq!(stored.id, "a");
        assert!(stored.updated_at >= local.updated_at);

        let again = api.create(&local).await.unwrap();
        assert_eq!(again, stored);
        assert_eq!(api.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_every_write_gets_a_new_version() {
        let api = InMemoryTodoApi::new();
        let created = api.create(&todo("a", "x")).await.unwrap();
        let first = api.update("a", &TodoPatch::completed(true), None).await.unwrap();
        let second = api.update("a", &TodoPatch::completed(false), None).await.unwrap();

        assert!(first.updated_at > created.updated_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_missing_todo_is_not_found() {
        let api = InMemoryTodoApi::new();
        assert_eq!(
            api.update("nope", &TodoPatch::title("x"), None).await.unwrap_err(),
            RemoteError::NotFound("nope".into())
        );
        assert!(matches!(
            api.delete("nope", None).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let api = InMemoryTodoApi::with_todos(vec![todo("a", "x")]);

        api.fail_next(2).await;
        assert!(api.list().await.unwrap_err().is_retryable());
        assert!(api.list().await.is_err());
        assert_eq!(api.list().await.unwrap().len(), 1);

        api.inject(RemoteError::rejected(400, "bad")).await;
        assert_eq!(
            api.delete("a", None).await.unwrap_err(),
            RemoteError::rejected(400, "bad")
        );

        api.set_offline(true).await;
        assert!(api.ping().await.is_err());
        api.set_offline(false).await;
        assert!(api.ping().await.is_ok());

        assert_eq!(api.calls().await.len(), 6);
    }

    #[tokio::test]
    async fn test_external_edits_bump_version() {
        let api = InMemoryTodoApi::new();
        let stored = api.create(&todo("a", "x")).await.unwrap();

        let edited = api.edit("a", &TodoPatch::title("y")).await.unwrap();
        assert_eq!(edited.title, "y");
        assert!(edited.updated_at > stored.updated_at);

        assert!(api.remove("a").await);
        assert!(api.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_base_is_refused_with_current_version() {
        let api = InMemoryTodoApi::new();
        let stored = api.create(&todo("a", "x")).await.unwrap();
        let edited = api.edit("a", &TodoPatch::title("theirs")).await.unwrap();

        let err = api
            .update("a", &TodoPatch::title("mine"), Some(stored.updated_at))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Conflict {
                current: Box::new(edited.clone())
            }
        );
        assert!(matches!(
            api.delete("a", Some(stored.updated_at)).await,
            Err(RemoteError::Conflict { .. })
        ));
        assert_eq!(api.get("a").await.unwrap().title, "theirs");

        let updated = api
            .update("a", &TodoPatch::title("mine"), Some(edited.updated_at))
            .await
            .unwrap();
        assert_eq!(updated.title, "mine");
        api.delete("a", Some(updated.updated_at)).await.unwrap();
        assert!(api.snapshot().await.is_empty());
    }
}
