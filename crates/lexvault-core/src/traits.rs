//! Repository and collaborator traits.
//!
//! The pipeline talks to persistence, retrieval and AI providers only through
//! these traits, so PostgreSQL and in-memory implementations are
//! interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use pgvector::Vector;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Document persistence.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Register an uploaded document in `uploaded` status.
    async fn insert(&self, doc: NewDocument) -> Result<Document>;

    /// Fetch a document by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Conditionally move a document to `next`.
    ///
    /// Applies only while the current status is one of `expected`; returns
    /// whether the row changed. Moving to `encrypted` also stamps
    /// `processed_at`.
    async fn transition(
        &self,
        id: Uuid,
        expected: &[DocumentStatus],
        next: DocumentStatus,
    ) -> Result<bool>;
}

/// The durable processing queue.
///
/// Every status change is a conditional update keyed on the current status.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Add a queued task. The queue does not deduplicate.
    async fn enqueue(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        payload: TaskPayload,
    ) -> Result<Uuid>;

    /// Atomically claim a specific queued task.
    ///
    /// Returns `None` if the task is no longer queued or another task for the
    /// same document is already processing.
    async fn claim(&self, task_id: Uuid) -> Result<Option<ProcessingTask>>;

    /// Claim the oldest queued task of the given kinds (empty = any kind).
    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<ProcessingTask>>;

    /// `processing -> completed`.
    async fn complete(&self, task_id: Uuid) -> Result<()>;

    /// `processing -> failed`, recording the reason.
    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()>;

    /// Fetch a task by ID.
    async fn get(&self, task_id: Uuid) -> Result<Option<ProcessingTask>>;

    /// All tasks for a document, oldest first.
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingTask>>;

    /// Task counts by status.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Re-enqueue a failed task as a fresh task with the same document,
    /// kind and payload. The failed task is left untouched.
    async fn retry(&self, task_id: Uuid) -> Result<Uuid>;

    /// Force-fail tasks that have been processing longer than `older_than`.
    async fn fail_stale(
        &self,
        older_than: Duration,
        reason: &str,
    ) -> Result<Vec<ProcessingTask>>;
}

/// Wrapped-key persistence. Records are append-only.
#[async_trait]
pub trait KeyRecordRepository: Send + Sync {
    async fn insert(
        &self,
        wrapped_dek: &str,
        created_by: Option<Uuid>,
    ) -> Result<EncryptionKeyRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<EncryptionKeyRecord>>;
}

/// Per-document encryption metadata, one row per document.
#[async_trait]
pub trait EncryptionMetadataRepository: Send + Sync {
    /// Insert or replace the metadata for `meta.document_id`.
    async fn upsert(&self, meta: &DocumentEncryptionMetadata) -> Result<()>;

    async fn get_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentEncryptionMetadata>>;
}

/// Storage for embedded document chunks.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Replace every chunk of a document with `chunks`.
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        chunks: &[DocumentChunk],
    ) -> Result<()>;

    async fn count_for_document(&self, document_id: Uuid) -> Result<i64>;
}

/// Vector similarity search over indexed chunks.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Matches for `case_id` with similarity at least `threshold`, sorted by
    /// descending similarity and truncated to `top_k`.
    async fn search(
        &self,
        case_id: Uuid,
        query: &Vector,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>>;
}

/// An AI provider: text embedding plus context-grounded generation.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name as selected in configuration (e.g. "openai").
    fn name(&self) -> &str;

    async fn generate_embedding(&self, text: &str) -> Result<Vector>;

    /// Answer `prompt` using the retrieved `context` passages.
    async fn generate_response(&self, prompt: &str, context: &[String]) -> Result<String>;
}

/// Makes decrypted document content available to similarity search.
#[async_trait]
pub trait ContentIndexer: Send + Sync {
    /// Index `content` for `document`, returning the number of chunks stored.
    async fn index_document(&self, document: &Document, content: &[u8]) -> Result<usize>;
}

/// Shared handles to every repository the pipeline uses.
#[derive(Clone)]
pub struct Repositories {
    pub documents: Arc<dyn DocumentRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub key_records: Arc<dyn KeyRecordRepository>,
    pub encryption_metadata: Arc<dyn EncryptionMetadataRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
}
