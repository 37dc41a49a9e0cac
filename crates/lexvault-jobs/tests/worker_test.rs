//! Worker runtime behaviour: step ordering, panic isolation, concurrent
//! processing and the stale-task sweeper.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::Harness;
use lexvault_core::{
    DocumentEncryptionMetadata, DocumentRepository, DocumentStatus, EncryptionKeyRecord,
    EncryptionMetadataRepository, KeyRecordRepository, NewDocument, ProcessingTask, QueueStats,
    Repositories, Result, ServerEvent, TaskKind, TaskPayload, TaskRepository, TaskStatus,
};
use lexvault_db::{DocumentStore, MemoryBackend, MemoryStore, StorageBackend};
use lexvault_jobs::{
    DocumentProcessor, JobContext, JobHandler, JobResult, JobWorker, StaleTaskSweeper,
    SweeperConfig, WorkerBuilder, WorkerConfig,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Journaling wrappers: record the order of the externally visible writes
// ---------------------------------------------------------------------------

type Journal = Arc<Mutex<Vec<&'static str>>>;

fn note(journal: &Journal, step: &'static str) {
    journal.lock().unwrap().push(step);
}

struct Journaled<T> {
    inner: T,
    journal: Journal,
}

#[async_trait]
impl KeyRecordRepository for Journaled<Arc<MemoryStore>> {
    async fn insert(
        &self,
        wrapped_dek: &str,
        created_by: Option<Uuid>,
    ) -> Result<EncryptionKeyRecord> {
        let record = KeyRecordRepository::insert(self.inner.as_ref(), wrapped_dek, created_by)
            .await?;
        note(&self.journal, "key_record");
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EncryptionKeyRecord>> {
        KeyRecordRepository::get(self.inner.as_ref(), id).await
    }
}

#[async_trait]
impl EncryptionMetadataRepository for Journaled<Arc<MemoryStore>> {
    async fn upsert(&self, meta: &DocumentEncryptionMetadata) -> Result<()> {
        self.inner.upsert(meta).await?;
        note(&self.journal, "metadata");
        Ok(())
    }

    async fn get_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentEncryptionMetadata>> {
        self.inner.get_for_document(document_id).await
    }
}

#[async_trait]
impl DocumentRepository for Journaled<Arc<MemoryStore>> {
    async fn insert(&self, doc: NewDocument) -> Result<lexvault_core::Document> {
        DocumentRepository::insert(self.inner.as_ref(), doc).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<lexvault_core::Document>> {
        DocumentRepository::get(self.inner.as_ref(), id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[DocumentStatus],
        next: DocumentStatus,
    ) -> Result<bool> {
        let changed = self.inner.transition(id, expected, next).await?;
        if changed && next == DocumentStatus::Encrypted {
            note(&self.journal, "status_encrypted");
        }
        Ok(changed)
    }
}

#[async_trait]
impl TaskRepository for Journaled<Arc<MemoryStore>> {
    async fn enqueue(
        &self,
        document_id: Uuid,
        kind: TaskKind,
        payload: TaskPayload,
    ) -> Result<Uuid> {
        self.inner.enqueue(document_id, kind, payload).await
    }

    async fn claim(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        self.inner.claim(task_id).await
    }

    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<ProcessingTask>> {
        self.inner.claim_next(kinds).await
    }

    async fn complete(&self, task_id: Uuid) -> Result<()> {
        self.inner.complete(task_id).await?;
        note(&self.journal, "task_completed");
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()> {
        self.inner.fail(task_id, error).await
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ProcessingTask>> {
        TaskRepository::get(self.inner.as_ref(), task_id).await
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingTask>> {
        self.inner.list_for_document(document_id).await
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        self.inner.queue_stats().await
    }

    async fn retry(&self, task_id: Uuid) -> Result<Uuid> {
        self.inner.retry(task_id).await
    }

    async fn fail_stale(
        &self,
        older_than: chrono::Duration,
        reason: &str,
    ) -> Result<Vec<ProcessingTask>> {
        self.inner.fail_stale(older_than, reason).await
    }
}

#[async_trait]
impl StorageBackend for Journaled<Arc<MemoryBackend>> {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        self.inner.upload(path, data).await?;
        if path.starts_with("encrypted/") {
            note(&self.journal, "ciphertext");
        }
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.download(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }
}

#[tokio::test]
async fn test_pipeline_writes_happen_in_order() {
    let h = Harness::new();
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let wrap = || {
        Arc::new(Journaled {
            inner: h.store.clone(),
            journal: journal.clone(),
        })
    };
    let repos = Repositories {
        documents: wrap(),
        tasks: wrap(),
        key_records: wrap(),
        encryption_metadata: wrap(),
        chunks: h.store.clone(),
    };
    let documents = DocumentStore::new(Arc::new(Journaled {
        inner: h.backend.clone(),
        journal: journal.clone(),
    }));

    let doc = h.upload(b"0123456789").await;
    h.enqueue(doc.id, TaskPayload::default()).await;

    let processor = DocumentProcessor::new(repos.clone(), documents, h.keys.clone(), h.events.clone());
    let worker = WorkerBuilder::new(repos.tasks.clone(), h.events.clone())
        .with_handler(processor)
        .build()
        .await;
    let processed = worker.process_one().await.unwrap().unwrap();
    assert_eq!(processed.status, TaskStatus::Completed);

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "key_record",
            "ciphertext",
            "metadata",
            "status_encrypted",
            "task_completed"
        ]
    );
}

// ---------------------------------------------------------------------------
// Panic isolation
// ---------------------------------------------------------------------------

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    fn task_kind(&self) -> TaskKind {
        TaskKind::DocumentAnalysis
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        if ctx.payload().ai_analysis {
            panic!("analysis exploded");
        }
        JobResult::Success(None)
    }
}

#[tokio::test]
async fn test_panicking_handler_fails_only_its_task() {
    let h = Harness::new();
    let bad = h.upload(b"bad").await;
    let good = h.upload(b"good").await;
    let bad_task = h
        .enqueue(bad.id, TaskPayload::default().with_ai_analysis(true))
        .await;
    let good_task = h.enqueue(good.id, TaskPayload::default()).await;

    let worker = WorkerBuilder::new(h.repos.tasks.clone(), h.events.clone())
        .with_handler(PanickingHandler)
        .build()
        .await;

    let first = worker.process_one().await.unwrap().unwrap();
    assert_eq!(first.task_id, bad_task);
    assert_eq!(first.status, TaskStatus::Failed);
    assert!(first.error_message.unwrap().contains("analysis exploded"));

    let second = worker.process_one().await.unwrap().unwrap();
    assert_eq!(second.task_id, good_task);
    assert_eq!(second.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_worker_without_handlers_claims_nothing() {
    let h = Harness::new();
    let doc = h.upload(b"idle").await;
    let task_id = h.enqueue(doc.id, TaskPayload::default()).await;

    let worker = JobWorker::new(h.repos.tasks.clone(), h.events.clone(), WorkerConfig::default());
    assert!(worker.process_one().await.unwrap().is_none());
    let task = h.repos.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
}

// ---------------------------------------------------------------------------
// Running worker
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_worker_never_exposes_encrypted_without_metadata() {
    let h = Harness::new();
    let mut ids = Vec::new();
    for i in 0..20 {
        let doc = h.upload(format!("document number {i}").as_bytes()).await;
        h.enqueue(doc.id, TaskPayload::default()).await;
        ids.push(doc.id);
    }

    let reader = {
        let store = h.store.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            let mut observed_encrypted = 0;
            while observed_encrypted < ids.len() {
                observed_encrypted = 0;
                for id in &ids {
                    let doc = DocumentRepository::get(store.as_ref(), *id)
                        .await
                        .unwrap()
                        .unwrap();
                    if doc.status == DocumentStatus::Encrypted {
                        observed_encrypted += 1;
                        assert!(
                            store.get_for_document(*id).await.unwrap().is_some(),
                            "document {id} is encrypted without metadata"
                        );
                    }
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let worker = h
        .worker(h.processor())
        .await;
    let handle = worker.start();
    tokio::time::timeout(Duration::from_secs(30), reader)
        .await
        .expect("all documents encrypted in time")
        .unwrap();
    handle.shutdown().await.unwrap();

    let stats = h.repos.tasks.queue_stats().await.unwrap();
    assert_eq!(stats.completed, 20);
    assert_eq!(stats.processing + stats.queued + stats.failed, 0);
    assert_eq!(h.store.key_record_count().await, 20);
}

#[tokio::test]
async fn test_disabled_worker_exits_immediately() {
    let h = Harness::new();
    let worker = WorkerBuilder::new(h.repos.tasks.clone(), h.events.clone())
        .with_config(WorkerConfig::default().with_enabled(false))
        .with_handler(h.processor())
        .build()
        .await;
    let handle = worker.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // The loop has already returned, so the signal has no receiver
    assert!(handle.shutdown().await.is_err());
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sweeper_fails_stale_tasks_and_allows_retry() {
    let h = Harness::new();
    let doc = h.upload(b"stuck").await;
    let task_id = h.enqueue(doc.id, TaskPayload::default()).await;
    // A worker claimed the task and then died
    h.repos.tasks.claim(task_id).await.unwrap().unwrap();
    let mut subscription = h.events.subscribe_document(doc.id);

    let sweeper = StaleTaskSweeper::new(
        h.repos.tasks.clone(),
        h.events.clone(),
        SweeperConfig::default().with_stale_after(Duration::ZERO),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    let swept = sweeper.sweep_once().await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].id, task_id);

    let event = subscription.recv_event().await.unwrap().unwrap();
    assert!(matches!(event.payload, ServerEvent::TaskFailed { task_id: id, .. } if id == task_id));

    let retry = h.repos.tasks.retry(task_id).await.unwrap();
    let processed = h
        .worker(h.processor())
        .await
        .process_one()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(processed.task_id, retry);
    assert_eq!(processed.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_sweeper_leaves_fresh_tasks_alone() {
    let h = Harness::new();
    let doc = h.upload(b"busy").await;
    let task_id = h.enqueue(doc.id, TaskPayload::default()).await;
    h.repos.tasks.claim(task_id).await.unwrap().unwrap();
    let mut all = h.events.subscribe();

    let sweeper = StaleTaskSweeper::new(
        h.repos.tasks.clone(),
        h.events.clone(),
        SweeperConfig::default(),
    );
    assert!(sweeper.sweep_once().await.unwrap().is_empty());

    let envelope = all.recv().await.unwrap();
    assert_eq!(
        envelope.payload,
        ServerEvent::QueueStatus {
            queued: 0,
            processing: 1,
            failed: 0
        }
    );
    let started = h.repos.tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(started.status, TaskStatus::Processing);
    assert!(started.started_at.unwrap() <= Utc::now());
}

#[tokio::test]
async fn test_sweeper_loop_stops_on_shutdown() {
    let h = Harness::new();
    let handle = StaleTaskSweeper::new(
        h.repos.tasks.clone(),
        h.events.clone(),
        SweeperConfig::default().with_interval(Duration::from_millis(5)),
    )
    .start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Filesystem storage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_filesystem_backend_stores_only_ciphertext_in_encrypted_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let backend = lexvault_db::FilesystemBackend::new(dir.path());
    backend.validate().await.unwrap();

    let h = Harness::new();
    let documents = DocumentStore::new(Arc::new(backend));
    let plaintext = b"privileged and confidential: settlement terms";
    let doc = lexvault_jobs::register_upload(
        &h.repos,
        &documents,
        h.case_id,
        "terms.txt",
        plaintext,
        None,
    )
    .await
    .unwrap();
    h.enqueue(doc.id, TaskPayload::default()).await;

    let processor = DocumentProcessor::new(
        h.repos.clone(),
        documents.clone(),
        h.keys.clone(),
        h.events.clone(),
    );
    let processed = h.worker(processor).await.process_one().await.unwrap().unwrap();
    assert_eq!(processed.status, TaskStatus::Completed);

    let meta = h.store.get_for_document(doc.id).await.unwrap().unwrap();
    let on_disk = std::fs::read(dir.path().join("encrypted").join(&meta.storage_path)).unwrap();
    assert_eq!(on_disk.len(), plaintext.len());
    assert_ne!(on_disk.as_slice(), plaintext.as_slice());
    assert!(meta.storage_path.ends_with(".enc"));

    let vault = lexvault_jobs::DocumentVault::new(h.repos.clone(), documents, h.keys.clone());
    let recovered = vault.read_decrypted(doc.id).await.unwrap();
    assert_eq!(recovered.as_slice(), plaintext.as_slice());
}
