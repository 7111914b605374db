//! Task registry and handles
//!
//! A task is one session's live worker plus its two durable streams. The
//! registry is process-local: exactly one process owns a session's work at
//! a time, and `session.task_id` is only meaningful while an entry exists
//! here.

pub mod runner;

pub use runner::AgentTaskRunner;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::queue::MessageQueue;

/// Builds the queue backing one named stream
pub type QueueFactory = Arc<dyn Fn(&str) -> Arc<dyn MessageQueue> + Send + Sync>;

/// The work a task executes
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    /// Process the input stream until it drains or the flow parks on Wait.
    /// Errors are the runner's to absorb (they become Error events).
    async fn run(&self, task: &TaskHandle);

    /// Finalize durable state after a cancellation: the runner must emit a
    /// terminal Done and mark the session completed before resources go.
    async fn finalize_cancel(&self, task: &TaskHandle);

    /// Release owned resources (sandbox, MCP clients)
    async fn destroy(&self);
}

struct TaskInner {
    id: String,
    input: Arc<dyn MessageQueue>,
    output: Arc<dyn MessageQueue>,
    runner: Arc<dyn TaskRunner>,
    cancel: CancellationToken,
    done: AtomicBool,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Shareable handle to one task
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
    registry: TaskRegistry,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn input_stream(&self) -> &Arc<dyn MessageQueue> {
        &self.inner.input
    }

    pub fn output_stream(&self) -> &Arc<dyn MessageQueue> {
        &self.inner.output
    }

    /// True when no live worker is attached
    pub async fn done(&self) -> bool {
        if self.inner.done.load(Ordering::Acquire) {
            return true;
        }
        let join = self.inner.join.lock().await;
        match join.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    /// Start (or restart) the worker. Idempotent while a worker is live.
    pub async fn run(&self) {
        let mut join = self.inner.join.lock().await;
        if let Some(handle) = join.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        self.inner.done.store(false, Ordering::Release);

        let task = self.clone();
        *join = Some(tokio::spawn(async move {
            let runner = task.inner.runner.clone();
            let cancelled = tokio::select! {
                _ = task.inner.cancel.cancelled() => true,
                _ = runner.run(&task) => false,
            };
            if cancelled {
                // The select dropped the run future at its last suspension
                // point; finalization runs outside the token's reach so the
                // terminal Done and status flip always land.
                tracing::info!(task_id = %task.inner.id, "Task cancelled, finalizing");
                runner.finalize_cancel(&task).await;
                runner.destroy().await;
            }
            task.inner.done.store(true, Ordering::Release);
            task.registry.remove(&task.inner.id).await;
            tracing::info!(task_id = %task.inner.id, "Task finished");
        }));
        tracing::info!(task_id = %self.inner.id, "Task execution started");
    }

    /// Advisory cancel; the worker finalizes and removes itself
    pub fn cancel(&self) {
        tracing::warn!(task_id = %self.inner.id, "Task cancel requested");
        self.inner.cancel.cancel();
    }

    async fn join(&self) {
        let handle = self.inner.join.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Process-local task registry
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<tokio::sync::RwLock<HashMap<String, TaskHandle>>>,
    queue_factory: QueueFactory,
}

impl TaskRegistry {
    pub fn new(queue_factory: QueueFactory) -> Self {
        Self {
            tasks: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            queue_factory,
        }
    }

    /// Register a new task with fresh input/output streams
    pub async fn create(&self, runner: Arc<dyn TaskRunner>) -> TaskHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let input = (self.queue_factory)(&format!("task:input:{id}"));
        let output = (self.queue_factory)(&format!("task:output:{id}"));
        let handle = TaskHandle {
            inner: Arc::new(TaskInner {
                id: id.clone(),
                input,
                output,
                runner,
                cancel: CancellationToken::new(),
                done: AtomicBool::new(true),
                join: Mutex::new(None),
            }),
            registry: self.clone(),
        };
        self.tasks.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskHandle> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn remove(&self, task_id: &str) {
        self.tasks.write().await.remove(task_id);
    }

    /// Cancel every task and wait for finalization within the shutdown
    /// budget; stragglers are abandoned with their durable state intact.
    pub async fn destroy(&self, budget: Duration) {
        let tasks: Vec<TaskHandle> = self.tasks.read().await.values().cloned().collect();
        for task in &tasks {
            task.cancel();
        }
        let drain = async {
            for task in &tasks {
                task.join().await;
                task.inner.runner.destroy().await;
            }
        };
        if tokio::time::timeout(budget, drain).await.is_err() {
            tracing::warn!(budget = ?budget, "Task registry destroy timed out, abandoning remaining work");
        }
        self.tasks.write().await.clear();
    }
}
