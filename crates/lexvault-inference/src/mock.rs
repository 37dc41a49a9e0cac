//! Deterministic provider for tests.
//!
//! Embeddings are derived from a SHA-256 of the input, so equal texts get
//! equal vectors and the same text always embeds the same way.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use lexvault_core::{AiProvider, Error, Result, Vector};

pub const DEFAULT_DIMENSION: usize = 8;

#[derive(Clone)]
pub struct MockProvider {
    dimension: usize,
    response: String,
    fail: Arc<AtomicBool>,
    embed_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            response: "Mock response".to_string(),
            fail: Arc::new(AtomicBool::new(false)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            generate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension.max(1);
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Make every subsequent call fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn embed_call_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn generate_call_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// The embedding this provider returns for `text`.
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while values.len() < self.dimension {
            let digest = Sha256::new()
                .chain_update(counter.to_le_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            values.extend(
                digest
                    .iter()
                    .map(|b| (*b as f32 / 127.5) - 1.0)
                    .take(self.dimension - values.len()),
            );
            counter += 1;
        }
        values
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vector> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("mock provider failure".to_string()));
        }
        Ok(Vector::from(self.embedding_for(text)))
    }

    async fn generate_response(&self, _prompt: &str, _context: &[String]) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Inference("mock provider failure".to_string()));
        }
        Ok(self.response.clone())
    }
}
