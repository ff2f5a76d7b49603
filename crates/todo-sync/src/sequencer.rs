//! # Operation Sequencer
//!
//! Runs remote work for the same todo strictly one after another, in
//! submission order. Work for different todos runs concurrently.
//!
//! ```text
//!  submit("a", j1) ─┐        ┌──────────────┐
//!  submit("a", j2) ─┼──────► │ worker "a"   │  j1 ──► j2   (FIFO)
//!                   │        └──────────────┘
//!  submit("b", j3) ─┴──────► │ worker "b"   │  j3          (parallel to "a")
//!                            └──────────────┘
//! ```
//!
//! A worker is spawned lazily for the first job of an id and removes itself
//! once its queue is empty. The emptiness check and the removal happen under
//! the same lock `submit` uses, so a job is never handed to a worker that is
//! about to exit.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{SyncError, SyncResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type Workers = HashMap<String, mpsc::UnboundedSender<Job>>;

/// Per-todo FIFO executor.
#[derive(Debug, Clone, Default)]
pub struct OperationSequencer {
    workers: Arc<Mutex<Workers>>,
}

impl OperationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind every earlier job for `key`.
    pub fn submit<F>(&self, key: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut workers = lock(&self.workers);

        let job: Job = Box::pin(job);
        let job = match workers.get(key) {
            Some(tx) => match tx.send(job) {
                Ok(()) => {
                    trace!(key, "Queued behind running worker");
                    return;
                }
                // Worker died (its job panicked); start a fresh one
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, so this cannot fail
        let _ = tx.send(job);
        workers.insert(key.to_string(), tx);
        debug!(key, "Spawning sequencer worker");

        tokio::spawn(run_worker(key.to_string(), rx, Arc::clone(&self.workers)));
    }

    /// Queues `job` and waits for its result.
    pub async fn run<F, T>(&self, key: &str, job: F) -> SyncResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(key, async move {
            let _ = tx.send(job.await);
        });
        rx.await
            .map_err(|_| SyncError::ChannelError(format!("sequenced job for {} dropped", key)))
    }

    /// Number of ids with queued or running work.
    pub fn active_keys(&self) -> usize {
        lock(&self.workers).len()
    }
}

async fn run_worker(key: String, mut rx: mpsc::UnboundedReceiver<Job>, workers: Arc<Mutex<Workers>>) {
    loop {
        let next = {
            let mut guard = lock(&workers);
            match rx.try_recv() {
                Ok(job) => Some(job),
                Err(_) => {
                    guard.remove(&key);
                    None
                }
            }
        };

        match next {
            Some(job) => job.await,
            None => break,
        }
    }
    trace!(key = %key, "Sequencer worker drained");
}

fn lock(workers: &Mutex<Workers>) -> MutexGuard<'_, Workers> {
    workers.lock().unwrap_or_else(PoisonError::into_inner)
}
