//! Retrieval-augmented answers over a case's indexed documents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use lexvault_core::{defaults, new_v7, AiProvider, Error, Result, SimilaritySearch};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagRequest {
    pub message: String,
    pub case_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    /// Provider to answer with; the default provider when absent.
    #[serde(default)]
    pub ai_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub response: String,
    pub sources_count: usize,
    pub conversation_id: Uuid,
    pub ai_provider: String,
}

/// Embeds the question, retrieves matching chunks and delegates the answer
/// to an AI provider.
///
/// Queries are always embedded with the default provider, the same one that
/// indexed the documents, so vectors stay comparable. `ai_provider` on the
/// request only selects who generates the answer.
pub struct RagService {
    search: Arc<dyn SimilaritySearch>,
    default_provider: Arc<dyn AiProvider>,
    providers: HashMap<String, Arc<dyn AiProvider>>,
    threshold: f32,
    top_k: usize,
}

impl RagService {
    pub fn new(search: Arc<dyn SimilaritySearch>, default_provider: Arc<dyn AiProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(default_provider.name().to_string(), default_provider.clone());
        Self {
            search,
            default_provider,
            providers,
            threshold: defaults::SIMILARITY_THRESHOLD,
            top_k: defaults::SIMILARITY_TOP_K,
        }
    }

    /// Register an additional provider selectable by name.
    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn generator(&self, name: Option<&str>) -> Result<&Arc<dyn AiProvider>> {
        match name {
            None => Ok(&self.default_provider),
            Some(name) => self
                .providers
                .get(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown AI provider: {}", name))),
        }
    }

    #[instrument(
        skip(self, request),
        fields(subsystem = "search", component = "rag", op = "answer", case_id = %request.case_id)
    )]
    pub async fn answer(&self, request: RagRequest) -> Result<RagResponse> {
        if request.message.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".to_string()));
        }
        let generator = self.generator(request.ai_provider.as_deref())?;
        let start = Instant::now();

        let query = self
            .default_provider
            .generate_embedding(&request.message)
            .await?;
        let matches = self
            .search
            .search(request.case_id, &query, self.threshold, self.top_k)
            .await?;
        for m in &matches {
            trace!(
                document_id = %m.document_id,
                chunk_index = m.chunk_index,
                similarity = m.similarity,
                "Retrieved chunk"
            );
        }
        debug!(result_count = matches.len(), "Retrieval complete");

        let context: Vec<String> = matches.into_iter().map(|m| m.content).collect();
        let response = generator
            .generate_response(&request.message, &context)
            .await?;

        let conversation_id = request.conversation_id.unwrap_or_else(new_v7);
        info!(
            conversation_id = %conversation_id,
            result_count = context.len(),
            provider = generator.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "RAG answer generated"
        );

        Ok(RagResponse {
            response,
            sources_count: context.len(),
            conversation_id,
            ai_provider: generator.name().to_string(),
        })
    }
}
