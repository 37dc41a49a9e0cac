//! Google Gemini provider (Generative Language API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lexvault_core::{defaults, AiProvider, Error, Result, Vector};

use crate::provider::{api_error, grounding_instructions};

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
pub const DEFAULT_GEN_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            timeout: Duration::from_secs(defaults::AI_TIMEOUT_SECS),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let fallback = Self::default();
        Self {
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(fallback.base_url),
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            embed_model: std::env::var("GEMINI_EMBED_MODEL").unwrap_or(fallback.embed_model),
            gen_model: std::env::var("GEMINI_GEN_MODEL").unwrap_or(fallback.gen_model),
            timeout: fallback.timeout,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            provider = "gemini",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing AI provider"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// POST `{base}/models/{model}:{method}` with the API key header.
    fn build_request(&self, model: &str, method: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        );
        let mut req = self.client.post(&url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-goog-api-key", api_key);
        }
        req.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vector> {
        debug!(model = %self.config.embed_model, len = text.len(), "Embedding text");

        let request = EmbedContentRequest {
            model: format!("models/{}", self.config.embed_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };

        let response = self
            .build_request(&self.config.embed_model, "embedContent")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Embedding(api_error("Gemini", response).await));
        }

        let body: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(Vector::from(body.embedding.values))
    }

    async fn generate_response(&self, prompt: &str, context: &[String]) -> Result<String> {
        debug!(
            model = %self.config.gen_model,
            context_passages = context.len(),
            "Generating response"
        );

        let system = grounding_instructions(context);
        let request = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .build_request(&self.config.gen_model, "generateContent")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Inference(api_error("Gemini", response).await));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }
}
