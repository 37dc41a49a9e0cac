//! # lexvault-search
//!
//! Makes encrypted documents answerable: decrypted text is chunked and
//! embedded by [`ChunkIndexer`], and [`RagService`] retrieves the closest
//! chunks of a case to ground provider answers.

pub mod chunking;
pub mod indexer;
pub mod rag;

pub use chunking::{Chunk, ChunkerConfig, SlidingWindowChunker};
pub use indexer::ChunkIndexer;
pub use rag::{RagRequest, RagResponse, RagService};
