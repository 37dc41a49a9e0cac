//! Provider factory and helpers shared by the HTTP providers.

use std::sync::Arc;

use serde::Deserialize;

use lexvault_core::{AiProvider, Result};

use crate::config::{ProviderConfig, ProviderKind};
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;

/// Build the provider selected by `config.kind`.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn AiProvider>> {
    Ok(match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config.openai.clone())?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config.gemini.clone())?),
    })
}

/// System instructions that ground generation in the retrieved passages.
pub(crate) fn grounding_instructions(context: &[String]) -> String {
    if context.is_empty() {
        return "You are a legal research assistant. No case documents matched this \
                question; say so rather than guessing."
            .to_string();
    }

    let mut out = String::from(
        "You are a legal research assistant. Answer using only the case document \
         excerpts below. If they do not contain the answer, say so.\n",
    );
    for (i, passage) in context.iter().enumerate() {
        out.push_str(&format!("\n[{}] {}\n", i + 1, passage));
    }
    out
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Describe a non-success response, preferring the API's own error message.
pub(crate) async fn api_error(provider: &str, response: reqwest::Response) -> String {
    let status = response.status();
    let message = response
        .json::<ApiErrorBody>()
        .await
        .map(|b| b.error.message)
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!("{} returned {}: {}", provider, status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounding_numbers_passages() {
        let text = grounding_instructions(&["first".to_string(), "second".to_string()]);
        assert!(text.contains("[1] first"));
        assert!(text.contains("[2] second"));
    }

    #[test]
    fn test_grounding_without_context() {
        let text = grounding_instructions(&[]);
        assert!(text.contains("No case documents matched"));
    }

    #[test]
    fn test_build_provider_selects_kind() {
        let config = ProviderConfig::default().with_kind(ProviderKind::Gemini);
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");

        let provider = build_provider(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
