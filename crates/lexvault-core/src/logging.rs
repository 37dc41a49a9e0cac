//! Structured logging field name constants for LexVault.
//!
//! All crates use these constants so log aggregation can query by the same
//! field names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, task failure, retry-eligible condition |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (chunks, search hits) |
//!
//! Key material, master secrets and document plaintext are never logged.

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "db", "storage", "crypto", "search", "inference"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "worker", "processor", "sweeper", "pool", "filesystem"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_next", "encrypt_document", "search"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Processing task UUID.
pub const TASK_ID: &str = "task_id";

/// Task kind (e.g. "document_analysis").
pub const TASK_KIND: &str = "task_kind";

/// Document UUID.
pub const DOCUMENT_ID: &str = "document_id";

/// Owning case UUID.
pub const CASE_ID: &str = "case_id";

/// Encryption key record UUID.
pub const KEY_RECORD_ID: &str = "key_record_id";

/// Bucket-relative storage locator.
pub const STORAGE_PATH: &str = "storage_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Byte length of a payload.
pub const BYTE_LEN: &str = "byte_len";

/// Number of results returned by a search.
pub const RESULT_COUNT: &str = "result_count";

/// Number of chunks produced or stored.
pub const CHUNK_COUNT: &str = "chunk_count";

// ─── Error fields ──────────────────────────────────────────────────────────

/// Error description.
pub const ERROR: &str = "error";
