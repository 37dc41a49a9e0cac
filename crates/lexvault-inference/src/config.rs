//! Provider selection and configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lexvault_core::{defaults, Error, Result};

use crate::gemini::GeminiConfig;
use crate::openai::OpenAiConfig;

/// The configured AI provider variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown AI provider: {}", other))),
        }
    }
}

/// Configuration for every supported provider; `kind` picks the active one.
///
/// | Variable | Default |
/// |----------|---------|
/// | `AI_PROVIDER` | `openai` |
/// | `AI_TIMEOUT_SECS` | `120` |
/// | `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_EMBED_MODEL`, `OPENAI_GEN_MODEL` | see [`OpenAiConfig`] |
/// | `GEMINI_BASE_URL`, `GEMINI_API_KEY`, `GEMINI_EMBED_MODEL`, `GEMINI_GEN_MODEL` | see [`GeminiConfig`] |
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        let kind = std::env::var("AI_PROVIDER")
            .unwrap_or_else(|_| defaults::AI_PROVIDER.to_string())
            .parse()?;
        let timeout = Duration::from_secs(
            std::env::var("AI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::AI_TIMEOUT_SECS),
        );

        Ok(Self {
            kind,
            openai: OpenAiConfig::from_env().with_timeout(timeout),
            gemini: GeminiConfig::from_env().with_timeout(timeout),
        })
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }
}
