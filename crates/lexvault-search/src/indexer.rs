//! Populates the chunk index from decrypted document content.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use lexvault_core::{
    AiProvider, ChunkRepository, ContentIndexer, Document, DocumentChunk, Error, Result,
};

use crate::chunking::SlidingWindowChunker;

/// Chunks UTF-8 text, embeds each chunk and replaces the document's stored
/// chunks. Non-text content is skipped.
pub struct ChunkIndexer {
    provider: Arc<dyn AiProvider>,
    chunks: Arc<dyn ChunkRepository>,
    chunker: SlidingWindowChunker,
}

impl ChunkIndexer {
    pub fn new(provider: Arc<dyn AiProvider>, chunks: Arc<dyn ChunkRepository>) -> Self {
        Self {
            provider,
            chunks,
            chunker: SlidingWindowChunker::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: SlidingWindowChunker) -> Self {
        self.chunker = chunker;
        self
    }
}

#[async_trait]
impl ContentIndexer for ChunkIndexer {
    #[instrument(
        skip(self, document, content),
        fields(subsystem = "search", component = "indexer", document_id = %document.id)
    )]
    async fn index_document(&self, document: &Document, content: &[u8]) -> Result<usize> {
        let Ok(text) = std::str::from_utf8(content) else {
            debug!(
                byte_len = content.len(),
                "Content is not UTF-8 text, skipping indexing"
            );
            return Ok(0);
        };

        let start = Instant::now();
        let windows = self.chunker.chunk(text);
        let mut chunks = Vec::with_capacity(windows.len());
        for (index, window) in windows.into_iter().enumerate() {
            let embedding = self.provider.generate_embedding(&window.text).await?;
            let chunk_index = i32::try_from(index)
                .map_err(|_| Error::InvalidInput("document has too many chunks".to_string()))?;
            chunks.push(DocumentChunk {
                document_id: document.id,
                case_id: document.case_id,
                chunk_index,
                content: window.text,
                embedding,
            });
        }

        self.chunks
            .replace_for_document(document.id, &chunks)
            .await?;

        info!(
            chunk_count = chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            provider = self.provider.name(),
            "Document indexed"
        );
        Ok(chunks.len())
    }
}
