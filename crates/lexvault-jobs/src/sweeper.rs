//! Force-fails tasks stuck in `processing`.
//!
//! A claimed task has no mid-flight cancellation. If its worker dies, the
//! task stays `processing` forever and, because only one task per document
//! may be processing, blocks that document. The sweeper fails such tasks
//! once they exceed the staleness threshold so they can be retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use lexvault_core::{
    defaults, Error, EventBus, ProcessingTask, Result, ServerEvent, TaskRepository,
};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Processing time after which a task counts as stuck.
    pub stale_after: Duration,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(defaults::TASK_STALE_AFTER_SECS),
            interval: Duration::from_secs(defaults::TASK_SWEEP_INTERVAL_SECS),
        }
    }
}

impl SweeperConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TASK_STALE_AFTER_SECS` | `1800` |
    /// | `TASK_SWEEP_INTERVAL_SECS` | `60` |
    pub fn from_env() -> Self {
        let secs = |var: &str, default: u64| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            stale_after: Duration::from_secs(secs(
                "TASK_STALE_AFTER_SECS",
                defaults::TASK_STALE_AFTER_SECS,
            )),
            interval: Duration::from_secs(
                secs("TASK_SWEEP_INTERVAL_SECS", defaults::TASK_SWEEP_INTERVAL_SECS).max(1),
            ),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Sweeper loop aborted: {}", e)))
    }
}

pub struct StaleTaskSweeper {
    tasks: Arc<dyn TaskRepository>,
    events: Arc<EventBus>,
    config: SweeperConfig,
}

impl StaleTaskSweeper {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<EventBus>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            tasks,
            events,
            config,
        }
    }

    /// Fail every stale task once and publish the resulting queue status.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "sweeper", op = "sweep"))]
    pub async fn sweep_once(&self) -> Result<Vec<ProcessingTask>> {
        let older_than = chrono::Duration::from_std(self.config.stale_after)
            .map_err(|e| Error::Config(format!("stale threshold out of range: {}", e)))?;
        let swept = self
            .tasks
            .fail_stale(older_than, defaults::STALE_TASK_REASON)
            .await?;

        for task in &swept {
            warn!(
                task_id = %task.id,
                document_id = %task.document_id,
                started_at = ?task.started_at,
                "Force-failed stale task"
            );
            self.events.emit(ServerEvent::TaskFailed {
                task_id: task.id,
                document_id: task.document_id,
                task_kind: task.kind.to_string(),
                error: defaults::STALE_TASK_REASON.to_string(),
            });
        }

        let stats = self.tasks.queue_stats().await?;
        debug!(
            result_count = swept.len(),
            queued = stats.queued,
            processing = stats.processing,
            failed = stats.failed,
            "Sweep complete"
        );
        self.events.emit(ServerEvent::QueueStatus {
            queued: stats.queued,
            processing: stats.processing,
            failed: stats.failed,
        });
        Ok(swept)
    }

    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            info!(
                stale_after_secs = self.config.stale_after.as_secs(),
                interval_secs = self.config.interval.as_secs(),
                "Stale task sweeper started"
            );
            loop {
                if let Err(e) = self.sweep_once().await {
                    error!(error = %e, "Stale task sweep failed");
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = sleep(self.config.interval) => {}
                }
            }
            info!("Stale task sweeper stopped");
        });
        SweeperHandle { shutdown_tx, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_config_defaults() {
        let config = SweeperConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(1800));
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_sweeper_config_builder() {
        let config = SweeperConfig::default()
            .with_stale_after(Duration::from_secs(5))
            .with_interval(Duration::from_millis(10));
        assert_eq!(config.stale_after, Duration::from_secs(5));
        assert_eq!(config.interval, Duration::from_millis(10));
    }
}
