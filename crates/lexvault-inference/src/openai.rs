//! OpenAI-compatible provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lexvault_core::{defaults, AiProvider, Error, Result, Vector};

use crate::provider::{api_error, grounding_instructions};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    /// Optional for local OpenAI-compatible endpoints.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            timeout: Duration::from_secs(defaults::AI_TIMEOUT_SECS),
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let fallback = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(fallback.base_url),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            embed_model: std::env::var("OPENAI_EMBED_MODEL").unwrap_or(fallback.embed_model),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(fallback.gen_model),
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
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            provider = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing AI provider"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req.header("Content-Type", "application/json")
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vector> {
        debug!(model = %self.config.embed_model, len = text.len(), "Embedding text");

        let response = self
            .build_request("/embeddings")
            .json(&EmbeddingRequest {
                model: &self.config.embed_model,
                input: text,
                encoding_format: "float",
            })
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Embedding(api_error("OpenAI", response).await));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        body.data
            .into_iter()
            .next()
            .map(|d| Vector::from(d.embedding))
            .ok_or_else(|| Error::Embedding("OpenAI returned no embedding".to_string()))
    }

    async fn generate_response(&self, prompt: &str, context: &[String]) -> Result<String> {
        debug!(
            model = %self.config.gen_model,
            context_passages = context.len(),
            "Generating response"
        );

        let system = grounding_instructions(context);
        let request = ChatCompletionRequest {
            model: &self.config.gen_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Inference(api_error("OpenAI", response).await));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
