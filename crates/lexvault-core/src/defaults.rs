//! Centralized default constants for LexVault.
//!
//! Every crate and the worker binary reads shared defaults from here instead
//! of defining its own magic numbers.

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Worker poll interval when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum tasks processed concurrently by one worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// A task processing longer than this is considered stale by the sweeper.
pub const TASK_STALE_AFTER_SECS: u64 = 30 * 60;

/// Interval between stale-task sweeps.
pub const TASK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Error message recorded on tasks force-failed by the sweeper.
pub const STALE_TASK_REASON: &str = "Task exceeded processing staleness threshold";

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast buffer size for the event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// STORAGE
// =============================================================================

/// Path prefix of the plaintext upload bucket.
pub const UPLOADS_PREFIX: &str = "uploads";

/// Path prefix of the ciphertext bucket.
pub const ENCRYPTED_PREFIX: &str = "encrypted";

/// File extension for stored ciphertext objects.
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Filesystem root of the object store when `STORAGE_ROOT` is not set.
pub const STORAGE_ROOT: &str = "/var/lib/lexvault/storage";

/// Environment variable holding the hex-encoded master secret.
pub const MASTER_KEY_ENV: &str = "LEXVAULT_MASTER_KEY";

/// Interval between connection pool metric log lines in the worker.
pub const POOL_METRICS_INTERVAL_SECS: u64 = 300;

// =============================================================================
// CHUNKING & RETRIEVAL
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Overlap characters between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 100;

/// Minimum cosine similarity for a chunk to be used as RAG context.
pub const SIMILARITY_THRESHOLD: f32 = 0.5;

/// Number of chunks retrieved for a RAG answer.
pub const SIMILARITY_TOP_K: usize = 5;

// =============================================================================
// AI PROVIDERS
// =============================================================================

/// Provider used when `AI_PROVIDER` is not set.
pub const AI_PROVIDER: &str = "openai";

/// Request timeout for provider HTTP calls.
pub const AI_TIMEOUT_SECS: u64 = 120;
