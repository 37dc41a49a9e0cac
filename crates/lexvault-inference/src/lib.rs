//! # lexvault-inference
//!
//! AI provider implementations behind the [`lexvault_core::AiProvider`]
//! capability interface.
//!
//! Providers:
//! - [`OpenAiProvider`]: OpenAI and OpenAI-compatible endpoints
//! - [`GeminiProvider`]: Google Generative Language API
//!
//! The active provider is chosen by configuration ([`ProviderKind`]) and
//! constructed with [`build_provider`]; callers only ever see
//! `Arc<dyn AiProvider>`.

pub mod config;
pub mod gemini;
pub mod openai;
pub mod provider;

#[cfg(feature = "mock")]
pub mod mock;

pub use config::{ProviderConfig, ProviderKind};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::build_provider;

#[cfg(feature = "mock")]
pub use mock::MockProvider;
