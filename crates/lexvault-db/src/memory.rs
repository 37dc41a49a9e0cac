//! In-memory implementations of every repository trait.
//!
//! A single [`MemoryStore`] holds all tables behind one lock, so each trait
//! method is atomic exactly like its conditional SQL counterpart. Used by
//! tests and single-process tooling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pgvector::Vector;
use tokio::sync::Mutex;
use uuid::Uuid;

use lexvault_core::{
    cosine_similarity, new_v7, rank_matches, ChunkRepository, Document, DocumentChunk,
    DocumentEncryptionMetadata, DocumentRepository, DocumentStatus, EncryptionKeyRecord,
    EncryptionMetadataRepository, Error, KeyRecordRepository, NewDocument, ProcessingTask,
    QueueStats, Repositories, Result, SimilarityMatch, SimilaritySearch, TaskKind, TaskPayload,
    TaskRepository, TaskStatus,
};

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    /// Keyed by UUIDv7, so iteration order is creation order.
    tasks: BTreeMap<Uuid, ProcessingTask>,
    key_records: HashMap<Uuid, EncryptionKeyRecord>,
    metadata: HashMap<Uuid, DocumentEncryptionMetadata>,
    chunks: HashMap<Uuid, Vec<DocumentChunk>>,
}

impl State {
    fn has_active_task(&self, document_id: Uuid) -> bool {
        self.tasks
            .values()
            .any(|t| t.document_id == document_id && t.status == TaskStatus::Processing)
    }

    fn transition_error(&self, task_id: Uuid, attempted: TaskStatus) -> Error {
        match self.tasks.get(&task_id) {
            Some(task) => Error::InvalidTransition(format!(
                "task {} is {}, cannot move to {}",
                task_id, task.status, attempted
            )),
            None => Error::NotFound(format!("task {}", task_id)),
        }
    }

    fn finish(&mut self, task_id: Uuid, next: TaskStatus, error: Option<&str>) -> Result<()> {
        let allowed = self
            .tasks
            .get(&task_id)
            .is_some_and(|t| t.status.can_transition_to(next));
        if !allowed {
            return Err(self.transition_error(task_id, next));
        }
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.status = next;
            task.completed_at = Some(Utc::now());
            task.error_message = error.map(String::from);
        }
        Ok(())
    }
}

/// Shared in-memory tables.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every repository handle backed by this store.
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            documents: self.clone(),
            tasks: self.clone(),
            key_records: self.clone(),
            encryption_metadata: self.clone(),
            chunks: self.clone(),
        }
    }

    pub async fn key_record_count(&self) -> usize {
        self.state.lock().await.key_records.len()
    }

    pub async fn metadata_count(&self) -> usize {
        self.state.lock().await.metadata.len()
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn insert(&self, doc: NewDocument) -> Result<Document> {
        let document = Document {
            id: new_v7(),
            case_id: doc.case_id,
            file_name: doc.file_name,
            storage_path: doc.storage_path,
            status: DocumentStatus::Uploaded,
            uploaded_by: doc.uploaded_by,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .documents
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[DocumentStatus],
        next: DocumentStatus,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.documents.get_mut(&id) {
            Some(doc) if expected.contains(&doc.status) => {
                doc.status = next;
                if next == DocumentStatus::Encrypted {
                    doc.processed_at = Some(Utc::now());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn enqueue(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        payload: TaskPayload,
    ) -> Result<Uuid> {
        let task = ProcessingTask {
            id: new_v7(),
            document_id,
            kind,
            status: TaskStatus::Queued,
            payload,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let id = task.id;
        self.state.lock().await.tasks.insert(id, task);
        Ok(id)
    }

    async fn claim(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        let mut state = self.state.lock().await;
        let document_id = match state.tasks.get(&task_id) {
            Some(task) if task.status == TaskStatus::Queued => task.document_id,
            _ => return Ok(None),
        };
        if state.has_active_task(document_id) {
            return Ok(None);
        }
        Ok(state.tasks.get_mut(&task_id).map(|task| {
            task.status = TaskStatus::Processing;
            task.started_at = Some(Utc::now());
            task.clone()
        }))
    }

    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<ProcessingTask>> {
        let mut state = self.state.lock().await;
        let candidate = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .filter(|t| kinds.is_empty() || kinds.contains(&t.kind))
            .find(|t| !state.has_active_task(t.document_id))
            .map(|t| t.id);

        Ok(candidate.and_then(|id| {
            state.tasks.get_mut(&id).map(|task| {
                task.status = TaskStatus::Processing;
                task.started_at = Some(Utc::now());
                task.clone()
            })
        }))
    }

    async fn complete(&self, task_id: Uuid) -> Result<()> {
        self.state
            .lock()
            .await
            .finish(task_id, TaskStatus::Completed, None)
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .finish(task_id, TaskStatus::Failed, Some(error))
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        Ok(self.state.lock().await.tasks.get(&task_id).cloned())
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingTask>> {
        Ok(self
            .state
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| t.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn retry(&self, task_id: Uuid) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        let original = match state.tasks.get(&task_id) {
            Some(task) if task.status == TaskStatus::Failed => task.clone(),
            _ => return Err(state.transition_error(task_id, TaskStatus::Queued)),
        };
        let fresh = ProcessingTask {
            id: new_v7(),
            status: TaskStatus::Queued,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            ..original
        };
        let id = fresh.id;
        state.tasks.insert(id, fresh);
        Ok(id)
    }

    async fn fail_stale(&self, older_than: Duration, reason: &str) -> Result<Vec<ProcessingTask>> {
        let now = Utc::now();
        let cutoff = now - older_than;
        let mut state = self.state.lock().await;
        let mut failed = Vec::new();
        for task in state.tasks.values_mut() {
            let stale = task.status == TaskStatus::Processing
                && task.started_at.is_some_and(|started| started < cutoff);
            if stale {
                task.status = TaskStatus::Failed;
                task.error_message = Some(reason.to_string());
                task.completed_at = Some(now);
                failed.push(task.clone());
            }
        }
        Ok(failed)
    }
}

#[async_trait]
impl KeyRecordRepository for MemoryStore {
    async fn insert(
        &self,
        wrapped_dek: &str,
        created_by: Option<Uuid>,
    ) -> Result<EncryptionKeyRecord> {
        let record = EncryptionKeyRecord {
            id: new_v7(),
            wrapped_dek: wrapped_dek.to_string(),
            created_by,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .key_records
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EncryptionKeyRecord>> {
        Ok(self.state.lock().await.key_records.get(&id).cloned())
    }
}

#[async_trait]
impl EncryptionMetadataRepository for MemoryStore {
    async fn upsert(&self, meta: &DocumentEncryptionMetadata) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.documents.contains_key(&meta.document_id) {
            return Err(Error::NotFound(format!("document {}", meta.document_id)));
        }
        if !state.key_records.contains_key(&meta.key_record_id) {
            return Err(Error::NotFound(format!("key record {}", meta.key_record_id)));
        }
        state.metadata.insert(meta.document_id, meta.clone());
        Ok(())
    }

    async fn get_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentEncryptionMetadata>> {
        Ok(self.state.lock().await.metadata.get(&document_id).cloned())
    }
}

#[async_trait]
impl ChunkRepository for MemoryStore {
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .chunks
            .insert(document_id, chunks.to_vec());
        Ok(())
    }

    async fn count_for_document(&self, document_id: Uuid) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .await
            .chunks
            .get(&document_id)
            .map_or(0, |c| c.len() as i64))
    }
}

#[async_trait]
impl SimilaritySearch for MemoryStore {
    async fn search(
        &self,
        case_id: Uuid,
        query: &Vector,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        let state = self.state.lock().await;
        let matches = state
            .chunks
            .values()
            .flatten()
            .filter(|c| c.case_id == case_id)
            .map(|c| SimilarityMatch {
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                similarity: cosine_similarity(c.embedding.as_slice(), query.as_slice()),
            })
            .collect();
        Ok(rank_matches(matches, threshold, top_k))
    }
}
