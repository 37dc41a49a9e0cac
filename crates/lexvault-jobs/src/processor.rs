//! Document encryption pipeline.
//!
//! For each claimed `document_analysis` task:
//!
//! 1. load the document
//! 2. read the plaintext upload
//! 3. generate a DEK, wrap it and persist the key record
//! 4. encrypt the plaintext
//! 5. upload the ciphertext to a fresh locator
//! 6. index content (when requested)
//! 7. persist the encryption metadata
//! 8. flip the document to `encrypted`
//!
//! The worker then completes the task. Plaintext and DEK live in zeroizing
//! buffers owned by [`DocumentProcessor::encrypt_document`], so they are
//! scrubbed when it returns on any path, including unwinding.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lexvault_core::{
    ContentIndexer, Document, DocumentEncryptionMetadata, DocumentStatus, Error, EventBus,
    ProcessingTask, Repositories, Result, ServerEvent, TaskKind,
};
use lexvault_crypto::{EnvelopeCipher, KeyManager, Zeroizing};
use lexvault_db::DocumentStore;

use crate::crypto_error;
use crate::handler::{JobContext, JobHandler, JobResult};

/// What a processing run did, reported as the task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Encrypted {
        key_record_id: Uuid,
        storage_path: String,
        chunk_count: usize,
    },
    /// The document was encrypted by an earlier task.
    AlreadyEncrypted,
    /// `encryption_required` was off; only indexing ran.
    Skipped { chunk_count: usize },
}

pub struct DocumentProcessor {
    repos: Repositories,
    store: DocumentStore,
    keys: Arc<KeyManager>,
    cipher: EnvelopeCipher,
    indexer: Option<Arc<dyn ContentIndexer>>,
    events: Arc<EventBus>,
}

impl DocumentProcessor {
    pub fn new(
        repos: Repositories,
        store: DocumentStore,
        keys: Arc<KeyManager>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            repos,
            store,
            keys,
            cipher: EnvelopeCipher::new(),
            indexer: None,
            events,
        }
    }

    /// Index decrypted content for tasks with `embedding_generation` set.
    pub fn with_indexer(mut self, indexer: Arc<dyn ContentIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Run steps 1-7 for a claimed task.
    #[instrument(
        skip(self, task),
        fields(
            subsystem = "jobs",
            component = "processor",
            op = "encrypt_document",
            task_id = %task.id,
            document_id = %task.document_id
        )
    )]
    pub async fn encrypt_document(&self, task: &ProcessingTask) -> Result<ProcessingOutcome> {
        let document = self
            .repos
            .documents
            .get(task.document_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", task.document_id)))?;

        if document.status == DocumentStatus::Encrypted {
            info!("Document already encrypted, nothing to do");
            return Ok(ProcessingOutcome::AlreadyEncrypted);
        }

        let plaintext = Zeroizing::new(self.store.read_upload(&document.storage_path).await?);
        debug!(byte_len = plaintext.len(), "Plaintext loaded");

        if !task.payload.encryption_required {
            let chunk_count = self.index(task, &document, &plaintext).await?;
            return Ok(ProcessingOutcome::Skipped { chunk_count });
        }

        // Key record first: a crash after this leaves only a harmless orphan.
        let dek = self.keys.generate_dek().map_err(crypto_error)?;
        let wrapped = self
            .keys
            .wrap_dek(&dek)
            .and_then(|w| w.to_json())
            .map_err(crypto_error)?;
        let key_record = self
            .repos
            .key_records
            .insert(&wrapped, document.uploaded_by)
            .await?;
        debug!(key_record_id = %key_record.id, "Key record stored");

        let sealed = self.cipher.encrypt(&plaintext, &dek).map_err(crypto_error)?;
        drop(dek);

        let storage_path = self
            .store
            .write_encrypted(document.case_id, document.id, &sealed.ciphertext)
            .await?;
        debug!(
            storage_path = %storage_path,
            byte_len = sealed.ciphertext.len(),
            "Ciphertext stored"
        );

        // Chunks must be searchable before anyone can observe `encrypted`,
        // and an indexing failure must not leave metadata behind.
        let chunk_count = self.index(task, &document, &plaintext).await?;

        self.repos
            .encryption_metadata
            .upsert(&DocumentEncryptionMetadata {
                document_id: document.id,
                key_record_id: key_record.id,
                storage_path: storage_path.clone(),
                nonce: sealed.nonce_hex(),
                auth_tag: sealed.tag_hex(),
                created_at: chrono::Utc::now(),
            })
            .await?;

        let flipped = self
            .repos
            .documents
            .transition(
                document.id,
                &[
                    DocumentStatus::Uploaded,
                    DocumentStatus::Queued,
                    DocumentStatus::Failed,
                ],
                DocumentStatus::Encrypted,
            )
            .await?;
        if !flipped {
            return Err(Error::InvalidTransition(format!(
                "document {} changed status during processing",
                document.id
            )));
        }

        self.events.emit(ServerEvent::DocumentEncrypted {
            document_id: document.id,
            case_id: document.case_id,
        });

        Ok(ProcessingOutcome::Encrypted {
            key_record_id: key_record.id,
            storage_path,
            chunk_count,
        })
    }

    async fn index(
        &self,
        task: &ProcessingTask,
        document: &Document,
        plaintext: &[u8],
    ) -> Result<usize> {
        if !task.payload.embedding_generation {
            return Ok(0);
        }
        match &self.indexer {
            Some(indexer) => indexer.index_document(document, plaintext).await,
            None => {
                warn!("Embedding generation requested but no indexer is configured");
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl JobHandler for DocumentProcessor {
    fn task_kind(&self) -> TaskKind {
        TaskKind::DocumentAnalysis
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();
        let result = self.encrypt_document(&ctx.task).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                info!(
                    subsystem = "jobs",
                    component = "processor",
                    task_id = %ctx.task_id(),
                    document_id = %ctx.document_id(),
                    duration_ms,
                    ?outcome,
                    "Document processed"
                );
                JobResult::Success(serde_json::to_value(&outcome).ok())
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "processor",
                    task_id = %ctx.task_id(),
                    document_id = %ctx.document_id(),
                    duration_ms,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Document processing failed"
                );
                JobResult::Failed(e)
            }
        }
    }
}
