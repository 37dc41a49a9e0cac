//! Shared fixtures for pipeline tests: in-memory repositories, an in-memory
//! object store and a fixed master secret.

#![allow(dead_code)]

use std::sync::Arc;

use lexvault_core::{Document, EventBus, Repositories, TaskKind, TaskPayload};
use lexvault_crypto::{KeyManager, MasterSecret};
use lexvault_db::{DocumentStore, MemoryBackend, MemoryStore};
use lexvault_jobs::{
    enqueue_document_processing, register_upload, DocumentProcessor, DocumentVault, JobWorker,
    WorkerBuilder, WorkerConfig,
};
use uuid::Uuid;

pub const MASTER: [u8; 32] = [0x42; 32];

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub repos: Repositories,
    pub backend: Arc<MemoryBackend>,
    pub documents: DocumentStore,
    pub keys: Arc<KeyManager>,
    pub events: Arc<EventBus>,
    pub case_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let backend = Arc::new(MemoryBackend::new());
        Self {
            repos: store.repositories(),
            store,
            documents: DocumentStore::new(backend.clone()),
            backend,
            keys: Arc::new(KeyManager::new(MasterSecret::from_bytes(MASTER))),
            events: Arc::new(EventBus::default()),
            case_id: Uuid::new_v4(),
        }
    }

    /// Replace the event bus with one holding only `capacity` events.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = Arc::new(EventBus::new(capacity));
        self
    }

    pub async fn upload(&self, data: &[u8]) -> Document {
        register_upload(
            &self.repos,
            &self.documents,
            self.case_id,
            "exhibit.txt",
            data,
            None,
        )
        .await
        .expect("register upload")
    }

    pub async fn enqueue(&self, document_id: Uuid, payload: TaskPayload) -> Uuid {
        enqueue_document_processing(
            &self.repos,
            &self.events,
            document_id,
            TaskKind::DocumentAnalysis,
            payload,
        )
        .await
        .expect("enqueue")
    }

    pub fn processor(&self) -> DocumentProcessor {
        DocumentProcessor::new(
            self.repos.clone(),
            self.documents.clone(),
            self.keys.clone(),
            self.events.clone(),
        )
    }

    pub fn vault(&self) -> DocumentVault {
        DocumentVault::new(self.repos.clone(), self.documents.clone(), self.keys.clone())
    }

    pub async fn worker(&self, processor: DocumentProcessor) -> JobWorker {
        WorkerBuilder::new(self.repos.tasks.clone(), self.events.clone())
            .with_config(WorkerConfig::default().with_poll_interval(10))
            .with_handler(processor)
            .build()
            .await
    }
}
