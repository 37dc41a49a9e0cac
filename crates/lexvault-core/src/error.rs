//! Error types for LexVault.
//!
//! The first five variants are the pipeline's failure taxonomy. Task failures
//! record the full `Display` text in `error_message` for operators, while
//! [`Error::public_message`] is what end users get to see.

use thiserror::Error;

/// Result type alias using LexVault's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LexVault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The random source is unavailable; keys must not be generated.
    #[error("Entropy error: {0}")]
    Entropy(String),

    /// Wrapping or unwrapping a data-encryption key failed.
    #[error("Key wrap error: {0}")]
    KeyWrap(String),

    /// Authenticated decryption rejected the ciphertext.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Object storage I/O failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional status transition did not apply.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a fresh task for the same document may succeed.
    ///
    /// Only storage failures qualify. Missing records point at an upstream
    /// consistency bug and crypto failures are fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Short failure reason safe to show to end users.
    ///
    /// Cryptographic detail is collapsed into a generic message.
    pub fn public_message(&self) -> String {
        match self {
            Error::Entropy(_) | Error::KeyWrap(_) | Error::Integrity(_) => {
                "Document could not be processed securely".to_string()
            }
            Error::Storage(_) => "Document storage is temporarily unavailable".to_string(),
            Error::NotFound(_) => "Document not found".to_string(),
            Error::InvalidTransition(_) => "Document is not in a processable state".to_string(),
            _ => "Document processing failed".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
