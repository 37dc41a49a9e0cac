//! # lexvault-core
//!
//! Core types, traits, and abstractions for the LexVault document pipeline.
//!
//! This crate provides the domain model (documents, processing tasks, key
//! records, encryption metadata), the error taxonomy shared by every other
//! crate, the repository and collaborator traits, and the document-scoped
//! event bus.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod ranking;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{DocumentSubscription, DocumentUpdate, EventBus, EventEnvelope, ServerEvent};
pub use models::*;
pub use ranking::{cosine_similarity, rank_matches};
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};

/// Re-export of the pgvector type used for embeddings.
pub use pgvector::Vector;
