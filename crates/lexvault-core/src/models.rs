//! Domain models for the document-processing pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Lifecycle status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Queued,
    Encrypted,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Encrypted => "encrypted",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "queued" => Ok(DocumentStatus::Queued),
            "encrypted" => Ok(DocumentStatus::Encrypted),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }
}

/// An uploaded document owned by a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub case_id: Uuid,
    pub file_name: String,
    /// Locator of the plaintext object inside the uploads bucket.
    pub storage_path: String,
    pub status: DocumentStatus,
    pub uploaded_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request to register a freshly uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub case_id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub uploaded_by: Option<Uuid>,
}

// =============================================================================
// PROCESSING TASKS
// =============================================================================

/// Kind of work a processing task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Encrypt the document at rest and hand its content to indexing.
    DocumentAnalysis,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::DocumentAnalysis => "document_analysis",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_analysis" => Ok(TaskKind::DocumentAnalysis),
            other => Err(Error::InvalidInput(format!("unknown task kind: {}", other))),
        }
    }
}

/// Status of a task in the processing queue.
///
/// The only legal sequence is `queued -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown task status: {}", other))),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Options carried by a document-analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default = "default_true")]
    pub encryption_required: bool,
    #[serde(default)]
    pub ai_analysis: bool,
    #[serde(default)]
    pub embedding_generation: bool,
}

impl Default for TaskPayload {
    fn default() -> Self {
        Self {
            encryption_required: true,
            ai_analysis: false,
            embedding_generation: false,
        }
    }
}

impl TaskPayload {
    pub fn with_embeddings(mut self, enabled: bool) -> Self {
        self.embedding_generation = enabled;
        self
    }

    pub fn with_ai_analysis(mut self, enabled: bool) -> Self {
        self.ai_analysis = enabled;
        self
    }

    pub fn with_encryption(mut self, required: bool) -> Self {
        self.encryption_required = required;
        self
    }
}

/// A unit of work in the processing queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub payload: TaskPayload,
    /// Set only on failure.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on claim.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once, on the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.queued + self.processing + self.completed + self.failed
    }
}

// =============================================================================
// ENCRYPTION RECORDS
// =============================================================================

/// A wrapped data-encryption key. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionKeyRecord {
    pub id: Uuid,
    /// Wire form of the wrapped key: `{"encrypted": hex, "iv": hex}`.
    pub wrapped_dek: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Where and how a document's ciphertext is stored.
///
/// Exists if and only if the document is `encrypted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEncryptionMetadata {
    pub document_id: Uuid,
    pub key_record_id: Uuid,
    /// Locator of the ciphertext inside the encrypted bucket.
    pub storage_path: String,
    /// 96-bit nonce, lowercase hex.
    pub nonce: String,
    /// 128-bit authentication tag, lowercase hex.
    pub auth_tag: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// RETRIEVAL
// =============================================================================

/// An embedded slice of document text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub document_id: Uuid,
    pub case_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vector,
}

/// A search hit. Produced per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub similarity: f32,
}
