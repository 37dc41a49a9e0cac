//! Sliding-window text chunking for embedding.
//!
//! Windows are measured in bytes and snapped to UTF-8 character boundaries,
//! so multi-byte text never splits inside a character.

use lexvault_core::defaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum window size in bytes.
    pub chunk_size: usize,
    /// Bytes shared between consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

/// A window of the source text with its byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

fn find_char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn find_char_boundary_after(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[derive(Debug, Clone, Default)]
pub struct SlidingWindowChunker {
    config: ChunkerConfig,
}

impl SlidingWindowChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into overlapping windows. Blank windows are dropped.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let size = self.config.chunk_size.max(1);
        let step = size.saturating_sub(self.config.overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let mut end = find_char_boundary_before(text, (start + size).min(text.len()));
            if end <= start {
                // Window narrower than one character
                end = find_char_boundary_after(text, start + 1);
            }

            let window = &text[start..end];
            if !window.trim().is_empty() {
                chunks.push(Chunk {
                    text: window.to_string(),
                    start_offset: start,
                    end_offset: end,
                });
            }

            if end >= text.len() {
                break;
            }
            start = find_char_boundary_after(text, start + step);
        }
        chunks
    }
}
