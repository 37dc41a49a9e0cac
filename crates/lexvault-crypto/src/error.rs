//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// Messages never carry key material or cipher internals.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// The operating-system random source failed.
    #[error("Random source unavailable: {0}")]
    Entropy(String),

    /// Wrapping or unwrapping a DEK failed.
    ///
    /// Unwrap reports a single reason for both malformed input and tag
    /// mismatch.
    #[error("Key wrap failed: {0}")]
    KeyWrap(&'static str),

    /// Authenticated decryption rejected the input.
    #[error("Integrity check failed")]
    Integrity,

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
