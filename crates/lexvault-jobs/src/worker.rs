//! Task worker: claims queued tasks and runs their handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use lexvault_core::{
    defaults, Error, EventBus, ProcessingTask, Result, ServerEvent, TaskKind, TaskRepository,
    TaskStatus,
};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the task worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent tasks.
    pub max_concurrent_jobs: usize,
    /// Whether to enable task processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent tasks |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Terminal state of a task run by [`JobWorker::process_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTask {
    pub task_id: Uuid,
    pub document_id: Uuid,
    pub status: TaskStatus,
    pub error_message: Option<String>,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop claiming new tasks and wait for in-flight tasks to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Worker loop aborted: {}", e)))
    }
}

type HandlerMap = Arc<RwLock<HashMap<TaskKind, Arc<dyn JobHandler>>>>;

/// Task worker that processes tasks from the queue.
pub struct JobWorker {
    tasks: Arc<dyn TaskRepository>,
    config: WorkerConfig,
    handlers: HandlerMap,
    events: Arc<EventBus>,
}

impl JobWorker {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<EventBus>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            tasks,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Register a handler for its task kind, replacing any previous one.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let kind = handler.task_kind();
        self.handlers.write().await.insert(kind, Arc::new(handler));
        debug!(task_kind = %kind, "Registered task handler");
    }

    /// Start the worker loop and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        WorkerHandle { shutdown_tx, join }
    }

    /// Claim and run a single task, if one is queued.
    pub async fn process_one(&self) -> Result<Option<ProcessedTask>> {
        let kinds = self.handled_kinds().await;
        if kinds.is_empty() {
            return Ok(None);
        }
        match self.tasks.claim_next(&kinds).await? {
            Some(task) => Ok(Some(self.clone_refs().execute_task(task).await)),
            None => Ok(None),
        }
    }

    /// Claims up to `max_concurrent_jobs` tasks at a time and runs them
    /// concurrently. Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Task worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Task worker started"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Task worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut running = tokio::task::JoinSet::new();
            for _ in 0..self.config.max_concurrent_jobs {
                match self.claim_task().await {
                    Some(task) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        running.spawn(async move {
                            worker.execute_task(task).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent task batch");
                while let Some(result) = running.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Task runner aborted");
                    }
                }
            }
        }

        info!("Task worker stopped");
    }

    async fn handled_kinds(&self) -> Vec<TaskKind> {
        self.handlers.read().await.keys().copied().collect()
    }

    async fn claim_task(&self) -> Option<ProcessingTask> {
        let kinds = self.handled_kinds().await;
        if kinds.is_empty() {
            return None;
        }
        match self.tasks.claim_next(&kinds).await {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "Failed to claim task");
                None
            }
        }
    }

    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            tasks: self.tasks.clone(),
            handlers: self.handlers.clone(),
            events: self.events.clone(),
        }
    }
}

/// Reference bundle for executing a single task in a spawned future.
struct JobWorkerRef {
    tasks: Arc<dyn TaskRepository>,
    handlers: HandlerMap,
    events: Arc<EventBus>,
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl JobWorkerRef {
    /// Run one claimed task to a terminal state.
    async fn execute_task(self, task: ProcessingTask) -> ProcessedTask {
        let start = Instant::now();
        let task_id = task.id;
        let document_id = task.document_id;
        let task_kind = task.kind;

        info!(%task_id, %document_id, %task_kind, "Processing task");
        self.events.emit(ServerEvent::TaskStarted {
            task_id,
            document_id,
            task_kind: task_kind.to_string(),
        });

        let handler = self.handlers.read().await.get(&task_kind).cloned();
        let result = match handler {
            Some(handler) => AssertUnwindSafe(handler.execute(JobContext::new(task)))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(%task_id, panic = message, "Task handler panicked");
                    JobResult::Failed(Error::Internal(format!(
                        "task handler panicked: {}",
                        message
                    )))
                }),
            None => {
                warn!(%task_kind, "No handler registered for task kind");
                JobResult::Failed(Error::Internal(format!(
                    "no handler for task kind {}",
                    task_kind
                )))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match result {
            JobResult::Success(data) => match self.tasks.complete(task_id).await {
                Ok(()) => {
                    info!(%task_id, %task_kind, duration_ms, result = ?data, "Task completed");
                    self.events.emit(ServerEvent::TaskCompleted {
                        task_id,
                        document_id,
                        task_kind: task_kind.to_string(),
                        duration_ms: Some(duration_ms as i64),
                    });
                    Ok((TaskStatus::Completed, None))
                }
                Err(e) => Err(e),
            },
            JobResult::Failed(err) => {
                let message = err.to_string();
                match self.tasks.fail(task_id, &message).await {
                    Ok(()) => {
                        warn!(
                            %task_id,
                            %task_kind,
                            duration_ms,
                            retryable = err.is_retryable(),
                            error = %message,
                            "Task failed"
                        );
                        self.events.emit(ServerEvent::TaskFailed {
                            task_id,
                            document_id,
                            task_kind: task_kind.to_string(),
                            error: err.public_message(),
                        });
                        Ok((TaskStatus::Failed, Some(message)))
                    }
                    Err(e) => Err(e),
                }
            }
        };

        let (status, error_message) = match outcome {
            Ok(terminal) => terminal,
            Err(e) => {
                // Typically the sweeper force-failed the task first.
                error!(%task_id, error = %e, "Failed to record terminal task state");
                match self.tasks.get(task_id).await {
                    Ok(Some(current)) => (current.status, current.error_message),
                    _ => (TaskStatus::Processing, None),
                }
            }
        };

        ProcessedTask {
            task_id,
            document_id,
            status,
            error_message,
        }
    }
}

/// Builder for creating a worker with handlers.
pub struct WorkerBuilder {
    tasks: Arc<dyn TaskRepository>,
    events: Arc<EventBus>,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(tasks: Arc<dyn TaskRepository>, events: Arc<EventBus>) -> Self {
        Self {
            tasks,
            events,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.tasks, self.events, self.config);
        {
            let mut handlers = worker.handlers.write().await;
            for handler in self.handlers {
                handlers.insert(handler.task_kind(), Arc::from(handler));
            }
        }
        worker
    }
}
