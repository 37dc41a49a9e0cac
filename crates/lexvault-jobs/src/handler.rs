//! Task handler contract.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use lexvault_core::{Error, ProcessingTask, TaskKind, TaskPayload};

/// Context provided to task handlers.
pub struct JobContext {
    /// The claimed task, already in `processing`.
    pub task: ProcessingTask,
}

impl JobContext {
    pub fn new(task: ProcessingTask) -> Self {
        Self { task }
    }

    pub fn task_id(&self) -> Uuid {
        self.task.id
    }

    pub fn document_id(&self) -> Uuid {
        self.task.document_id
    }

    pub fn payload(&self) -> TaskPayload {
        self.task.payload
    }
}

/// Result of task execution.
#[derive(Debug)]
pub enum JobResult {
    /// Task completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Task failed. The error's `Display` text becomes the task's
    /// `error_message`.
    Failed(Error),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<lexvault_core::Result<Option<JsonValue>>> for JobResult {
    fn from(result: lexvault_core::Result<Option<JsonValue>>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(e) => Self::Failed(e),
        }
    }
}

/// Trait for task handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The task kind this handler processes.
    fn task_kind(&self) -> TaskKind;

    /// Execute a claimed task. Must not return before every sensitive buffer
    /// it created has been scrubbed.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    fn can_handle(&self, kind: TaskKind) -> bool {
        self.task_kind() == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexvault_core::TaskStatus;

    fn task() -> ProcessingTask {
        ProcessingTask {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            kind: TaskKind::DocumentAnalysis,
            status: TaskStatus::Processing,
            payload: TaskPayload::default().with_embeddings(true),
            error_message: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    #[test]
    fn test_context_accessors() {
        let task = task();
        let ctx = JobContext::new(task.clone());
        assert_eq!(ctx.task_id(), task.id);
        assert_eq!(ctx.document_id(), task.document_id);
        assert!(ctx.payload().embedding_generation);
        assert!(ctx.payload().encryption_required);
    }

    #[test]
    fn test_job_result_from_result() {
        assert!(JobResult::from(Ok(None)).is_success());
        let failed = JobResult::from(Err(Error::Storage("down".into())));
        assert!(matches!(failed, JobResult::Failed(Error::Storage(_))));
    }
}
