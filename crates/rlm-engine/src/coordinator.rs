//! Async entry point for batch and server workloads.
//!
//! A fixed pool of reasoning workers pulls tasks from a FIFO queue; a
//! global semaphore caps in-flight tasks end-to-end. One permit covers a
//! whole recursion tree — sub-invocations never acquire their own — and is
//! held from before `submit` returns until the task's future resolves.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rlm_core::config::CoordinatorConfig;
use rlm_core::{EngineError, UsageRecord};

use crate::controller::RecursionController;

/// One unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub query: String,
    pub context_text: Option<String>,
    pub options: TaskOptions,
}

impl Task {
    pub fn new(query: impl Into<String>) -> Self {
        Task { query: query.into(), context_text: None, options: TaskOptions::default() }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_text = Some(context.into());
        self
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-task overrides.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub max_depth: Option<u32>,
    pub wall_timeout_ms: Option<u64>,
    /// Root model override for this task only.
    pub model: Option<String>,
    /// Optional end-to-end deadline. None by default.
    pub deadline: Option<Duration>,
}

/// Terminal failure of a task.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task exceeded its end-to-end deadline")]
    DeadlineExceeded,
    #[error("model unavailable: {detail}")]
    ModelUnavailable { detail: String },
    #[error("could not open a sandbox session: {detail}")]
    SessionUnavailable { detail: String },
    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },
    #[error("internal failure: {detail}")]
    Internal { detail: String },
}

impl From<EngineError> for TaskError {
    fn from(err: EngineError) -> Self {
        use rlm_core::ModelError;
        match err {
            EngineError::Cancelled => TaskError::Cancelled,
            EngineError::DeadlineExceeded => TaskError::DeadlineExceeded,
            EngineError::SessionUnavailable(e) => {
                TaskError::SessionUnavailable { detail: e.to_string() }
            }
            EngineError::Model(ModelError::InvalidRequest(detail)) => {
                TaskError::InvalidRequest { detail }
            }
            EngineError::Model(e) => TaskError::ModelUnavailable { detail: e.to_string() },
        }
    }
}

/// What a task's future resolves to.
#[derive(Debug)]
pub struct TaskResult {
    pub answer: String,
    pub recursion_id: Option<rlm_core::RecursionId>,
    pub usage_total: UsageRecord,
    pub per_level_usage: Vec<UsageRecord>,
    pub wallclock_ms: u64,
    pub error: Option<TaskError>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(error: TaskError, wallclock_ms: u64) -> Self {
        TaskResult {
            answer: String::new(),
            recursion_id: None,
            usage_total: UsageRecord::default(),
            per_level_usage: Vec::new(),
            wallclock_ms,
            error: Some(error),
        }
    }
}

/// Handle to a submitted task.
pub struct TaskHandle {
    cancel: CancellationToken,
    reply: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    /// Request cooperative cancellation of the whole recursion tree.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish.
    pub async fn join(self) -> TaskResult {
        match self.reply.await {
            Ok(result) => result,
            Err(_) => TaskResult::failed(
                TaskError::Internal { detail: "worker dropped the task".into() },
                0,
            ),
        }
    }
}

struct Job {
    task: Task,
    cancel: CancellationToken,
    reply: oneshot::Sender<TaskResult>,
    _permit: OwnedSemaphorePermit,
}

pub struct TaskCoordinator {
    queue: mpsc::Sender<Job>,
    permits: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskCoordinator {
    pub fn new(controller: Arc<RecursionController>, config: CoordinatorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let (queue, rx) = mpsc::channel::<Job>(config.queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.worker_pool_size.max(1))
            .map(|worker_index| {
                let rx = Arc::clone(&rx);
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else { break };
                        debug!(worker = worker_index, "worker picked up task");
                        run_job(&controller, job).await;
                    }
                    debug!(worker = worker_index, "worker stopped");
                })
            })
            .collect();

        TaskCoordinator { queue, permits, workers }
    }

    /// Submit one task. Suspends while the global permit pool is
    /// saturated or the queue is full; returns once the task is admitted.
    pub async fn submit(&self, task: Task) -> TaskHandle {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("coordinator semaphore closed");
        let cancel = CancellationToken::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job { task, cancel: cancel.clone(), reply: reply_tx, _permit: permit };
        if self.queue.send(job).await.is_err() {
            warn!("task queue is closed; coordinator is shutting down");
        }
        TaskHandle { cancel, reply: reply_rx }
    }

    /// Submit several tasks; handles come back in submission order.
    pub async fn submit_batch(&self, tasks: Vec<Task>) -> Vec<TaskHandle> {
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            handles.push(self.submit(task).await);
        }
        handles
    }

    /// Stop accepting tasks and wait for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_job(controller: &Arc<RecursionController>, job: Job) {
    let started = Instant::now();
    let Job { task, cancel, reply, _permit } = job;

    // An optional end-to-end deadline trips the same cooperative token as
    // user cancellation; the cause is disambiguated after the fact.
    let deadline = task.options.deadline;
    let deadline_elapsed = Arc::new(Mutex::new(false));
    let timer = deadline.map(|after| {
        let cancel = cancel.clone();
        let deadline_elapsed = Arc::clone(&deadline_elapsed);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            *deadline_elapsed.lock().expect("deadline flag lock") = true;
            cancel.cancel();
        })
    });

    let scoped = controller.with_overrides(
        task.options.max_depth,
        task.options.wall_timeout_ms,
        task.options.model.clone(),
    );
    let outcome = scoped
        .run_root(task.query, task.context_text, cancel.clone())
        .await;

    if let Some(timer) = timer {
        timer.abort();
    }

    let wallclock_ms = started.elapsed().as_millis() as u64;
    let result = match outcome {
        Ok(tree) => TaskResult {
            answer: tree.answer,
            recursion_id: Some(tree.root_recursion_id),
            usage_total: UsageRecord::total_of(&tree.per_level_usage),
            per_level_usage: tree.per_level_usage,
            wallclock_ms,
            error: None,
        },
        Err(EngineError::Cancelled) if *deadline_elapsed.lock().expect("deadline flag lock") => {
            TaskResult::failed(TaskError::DeadlineExceeded, wallclock_ms)
        }
        Err(err) => TaskResult::failed(err.into(), wallclock_ms),
    };

    let _ = reply.send(result);
}
