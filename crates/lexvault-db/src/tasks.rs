//! Processing queue repository implementation.
//!
//! Every transition is a single conditional `UPDATE ... WHERE status = ...`,
//! so concurrent workers can never both move a task out of the same state.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use lexvault_core::{
    new_v7, Error, ProcessingTask, QueueStats, Result, TaskKind, TaskPayload, TaskRepository,
    TaskStatus,
};

const TASK_COLUMNS: &str = "id, document_id, task_kind, status, payload, error_message, \
                            created_at, started_at, completed_at";

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL implementation of TaskRepository.
#[derive(Clone)]
pub struct PgTaskRepository {
    pool: Pool<Postgres>,
}

impl PgTaskRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_task_row(row: sqlx::postgres::PgRow) -> Result<ProcessingTask> {
        let kind: String = row.get("task_kind");
        let status: String = row.get("status");
        let payload: JsonValue = row.get("payload");
        Ok(ProcessingTask {
            id: row.get("id"),
            document_id: row.get("document_id"),
            kind: kind.parse()?,
            status: status.parse()?,
            payload: serde_json::from_value::<TaskPayload>(payload)?,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// The one-processing-task-per-document index rejected the claim.
    fn is_active_conflict(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
            _ => false,
        }
    }

    /// Explain why a conditional update touched no rows.
    async fn transition_error(&self, task_id: Uuid, attempted: TaskStatus) -> Error {
        match self.get(task_id).await {
            Ok(Some(task)) => Error::InvalidTransition(format!(
                "task {} is {}, cannot move to {}",
                task_id, task.status, attempted
            )),
            Ok(None) => Error::NotFound(format!("task {}", task_id)),
            Err(e) => e,
        }
    }

    async fn claim_with(
        &self,
        query: &str,
        bind_id: Option<Uuid>,
        kinds: &[TaskKind],
    ) -> Result<Option<ProcessingTask>> {
        let kind_strings: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let mut q = sqlx::query(query).bind(Utc::now());
        q = match bind_id {
            Some(id) => q.bind(id),
            None => q.bind(kind_strings),
        };

        match q.fetch_optional(&self.pool).await {
            Ok(row) => row.map(Self::parse_task_row).transpose(),
            Err(e) if Self::is_active_conflict(&e) => {
                debug!(
                    subsystem = "db",
                    component = "tasks",
                    op = "claim",
                    "Claim lost to an active task for the same document"
                );
                Ok(None)
            }
            Err(e) => Err(Error::Database(e)),
        }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn enqueue(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        payload: TaskPayload,
    ) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO processing_task (id, document_id, task_kind, status, payload, created_at)
             VALUES ($1, $2, $3, 'queued', $4, $5)",
        )
        .bind(id)
        .bind(document_id)
        .bind(kind.as_str())
        .bind(serde_json::to_value(payload)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn claim(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        let query = format!(
            "UPDATE processing_task t
             SET status = 'processing', started_at = $1
             WHERE t.id = $2
               AND t.status = 'queued'
               AND NOT EXISTS (
                   SELECT 1 FROM processing_task p
                   WHERE p.document_id = t.document_id AND p.status = 'processing'
               )
             RETURNING {TASK_COLUMNS}"
        );
        self.claim_with(&query, Some(task_id), &[]).await
    }

    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<ProcessingTask>> {
        // Filter by kind before locking; SKIP LOCKED lets workers pass over
        // rows another worker is claiming.
        let query = format!(
            "UPDATE processing_task
             SET status = 'processing', started_at = $1
             WHERE id = (
                 SELECT t.id FROM processing_task t
                 WHERE t.status = 'queued'
                   AND (cardinality($2::text[]) = 0 OR t.task_kind = ANY($2))
                   AND NOT EXISTS (
                       SELECT 1 FROM processing_task p
                       WHERE p.document_id = t.document_id AND p.status = 'processing'
                   )
                 ORDER BY t.created_at ASC, t.id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             AND status = 'queued'
             RETURNING {TASK_COLUMNS}"
        );
        self.claim_with(&query, None, kinds).await
    }

    async fn complete(&self, task_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE processing_task
             SET status = 'completed', completed_at = $2
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(task_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(task_id, TaskStatus::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE processing_task
             SET status = 'failed', error_message = $2, completed_at = $3
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(task_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(task_id, TaskStatus::Failed).await);
        }
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM processing_task WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_task_row).transpose()
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM processing_task
             WHERE document_id = $1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_task_row).collect()
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM processing_task GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            match status.parse::<TaskStatus>()? {
                TaskStatus::Queued => stats.queued = n,
                TaskStatus::Processing => stats.processing = n,
                TaskStatus::Completed => stats.completed = n,
                TaskStatus::Failed => stats.failed = n,
            }
        }
        Ok(stats)
    }

    async fn retry(&self, task_id: Uuid) -> Result<Uuid> {
        let new_id = new_v7();
        let row = sqlx::query(
            "INSERT INTO processing_task (id, document_id, task_kind, status, payload, created_at)
             SELECT $2, document_id, task_kind, 'queued', payload, $3
             FROM processing_task
             WHERE id = $1 AND status = 'failed'
             RETURNING id",
        )
        .bind(task_id)
        .bind(new_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(_) => Ok(new_id),
            None => Err(self.transition_error(task_id, TaskStatus::Queued).await),
        }
    }

    async fn fail_stale(&self, older_than: Duration, reason: &str) -> Result<Vec<ProcessingTask>> {
        let now = Utc::now();
        let rows = sqlx::query(&format!(
            "UPDATE processing_task
             SET status = 'failed', error_message = $2, completed_at = $3
             WHERE status = 'processing' AND started_at < $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(now - older_than)
        .bind(reason)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_task_row).collect()
    }
}
