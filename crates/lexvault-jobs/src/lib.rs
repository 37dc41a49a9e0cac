//! # lexvault-jobs
//!
//! The processing side of LexVault: a worker that claims tasks from the
//! durable queue, the document encryption pipeline it runs, submission entry
//! points for the upload flow, the decryption path and the stale-task sweeper.
//!
//! ## Architecture
//!
//! ```text
//! register_upload ─► enqueue_document_processing ─► processing_task (queued)
//!                                                         │
//!                          JobWorker::claim_next ◄────────┘
//!                                   │
//!                          DocumentProcessor ─► key record ─► ciphertext
//!                                   │              ─► metadata ─► status
//!                                   ▼
//!                         complete / fail + EventBus
//! ```

pub mod handler;
pub mod processor;
pub mod submission;
pub mod sweeper;
pub mod vault;
pub mod worker;

pub use handler::{JobContext, JobHandler, JobResult};
pub use processor::{DocumentProcessor, ProcessingOutcome};
pub use submission::{enqueue_document_processing, register_upload};
pub use sweeper::{StaleTaskSweeper, SweeperConfig, SweeperHandle};
pub use vault::DocumentVault;
pub use worker::{JobWorker, ProcessedTask, WorkerBuilder, WorkerConfig, WorkerHandle};

use lexvault_core::Error;
use lexvault_crypto::CryptoError;

/// Lift a crypto failure into the pipeline's error taxonomy.
pub(crate) fn crypto_error(err: CryptoError) -> Error {
    match err {
        CryptoError::Entropy(msg) => Error::Entropy(msg),
        CryptoError::KeyWrap(reason) => Error::KeyWrap(reason.to_string()),
        CryptoError::Integrity => Error::Integrity("authentication tag mismatch".to_string()),
        CryptoError::InvalidInput(msg) => Error::InvalidInput(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_mapping() {
        assert!(matches!(
            crypto_error(CryptoError::Integrity),
            Error::Integrity(_)
        ));
        assert!(matches!(
            crypto_error(CryptoError::KeyWrap("unwrap failed")),
            Error::KeyWrap(ref m) if m == "unwrap failed"
        ));
        assert!(matches!(
            crypto_error(CryptoError::Entropy("no rng".into())),
            Error::Entropy(_)
        ));
    }
}
