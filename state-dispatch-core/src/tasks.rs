//! Task manager for async operations
//!
//! Provides lifecycle management for async tasks with support for:
//! - Automatic cancellation when spawning with same key
//! - Debounced execution
//! - Manual cancellation
//!
//! Tasks never touch the store. Each one resolves to an [`Action`] that is
//! sent back over a channel and dispatched by the task that owns the store
//! (see [`ActionQueue`](crate::ActionQueue)).
//!
//! # Example
//!
//! ```ignore
//! use state_dispatch::tasks::{TaskKey, TaskManager};
//! use state_dispatch::{Action, ActionQueue};
//! use std::time::Duration;
//!
//! let (tx, mut queue) = ActionQueue::channel();
//! let mut tasks = TaskManager::new(tx);
//!
//! // Spawn a task - any existing task with same key is cancelled
//! tasks.spawn("fetch", async {
//!     let data = fetch_data().await;
//!     Action::new("FETCH_DONE").unwrap().with_payload(data)
//! });
//!
//! // Debounced task - waits before executing, resets on each call
//! tasks.debounce("search", Duration::from_millis(200), async move {
//!     let results = search(query).await;
//!     Action::new("SEARCH_DONE").unwrap().with_payload(results)
//! });
//!
//! tasks.cancel(&TaskKey::new("fetch"));
//! tasks.cancel_all();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::action::Action;

/// Identifies a task for cancellation and replacement.
///
/// Tasks with the same key are mutually exclusive - spawning a new task
/// with a key that's already running will cancel the existing task.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Manages async task lifecycle with automatic cancellation.
///
/// The task manager maintains a registry of running tasks by key.
/// When a new task is spawned with a key that already exists,
/// the existing task is cancelled before the new one starts.
/// Dropping the manager aborts everything still running.
pub struct TaskManager {
    tasks: HashMap<TaskKey, AbortHandle>,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl TaskManager {
    /// Create a new task manager.
    ///
    /// The `action_tx` channel is used to send actions back to the owner
    /// loop when tasks complete.
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            tasks: HashMap::new(),
            action_tx,
        }
    }

    /// Spawn a task, cancelling any existing task with the same key.
    ///
    /// The action the future resolves to is sent to the action channel.
    /// If the task is cancelled before completion, nothing is sent.
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&mut self, key: impl Into<TaskKey>, future: F) -> &mut Self
    where
        F: Future<Output = Action> + Send + 'static,
    {
        self.spawn_after(key.into(), None, future)
    }

    /// Spawn a task with debounce - waits for duration before executing.
    ///
    /// If called again with the same key before the duration expires,
    /// the previous task is cancelled and the timer resets.
    pub fn debounce<F>(
        &mut self,
        key: impl Into<TaskKey>,
        duration: Duration,
        future: F,
    ) -> &mut Self
    where
        F: Future<Output = Action> + Send + 'static,
    {
        self.spawn_after(key.into(), Some(duration), future)
    }

    fn spawn_after<F>(&mut self, key: TaskKey, delay: Option<Duration>, future: F) -> &mut Self
    where
        F: Future<Output = Action> + Send + 'static,
    {
        self.cancel(&key);
        self.prune();

        let tx = self.action_tx.clone();
        let task_key = key.clone();
        let handle: JoinHandle<()> = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let action = future.await;
            if tx.send(action).is_err() {
                tracing::debug!(task = %task_key, "action channel closed, result dropped");
            }
        });

        tracing::trace!(task = %key, debounce = ?delay, "task spawned");
        self.tasks.insert(key, handle.abort_handle());
        self
    }

    /// Cancel a task by key.
    ///
    /// Returns `true` if an unfinished task was aborted.
    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        match self.tasks.remove(key) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                if running {
                    tracing::trace!(task = %key, "task cancelled");
                }
                running
            }
            None => false,
        }
    }

    /// Cancel all running tasks.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Forget tasks that already completed.
    pub fn prune(&mut self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Check if a task with the given key is still running.
    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.tasks.get(key).is_some_and(|handle| !handle.is_finished())
    }

    /// Number of tracked tasks, including finished ones not yet pruned.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn running_keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(key, _)| key)
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
