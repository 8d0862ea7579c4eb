//! Content generation providers
//!
//! Text and image generation sit behind the [`ContentGenerator`] capability
//! interface with one adapter per provider: [`openai`] (ChatGPT + DALL·E),
//! [`yandex`] (YandexGPT, text only) and [`fusionbrain`] (images only).
//! The orchestrator selects a
//! provider by the schedule's generator name at run time and owns both the
//! dedup cache and the (absent) retry policy; adapters do a single call.

pub mod fusionbrain;
pub mod openai;
pub mod yandex;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::GenerationParams;

pub use fusionbrain::FusionBrainGenerator;
pub use openai::OpenAiGenerator;
pub use yandex::YandexGenerator;

/// Errors from a generation provider call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The provider call failed (timeout, quota, malformed response)
    #[error("{provider} generation failed: {reason}")]
    Provider { provider: String, reason: String },

    /// The provider does not implement this capability at all
    #[error("{provider} does not support {capability} generation")]
    NotSupported {
        provider: String,
        capability: &'static str,
    },

    /// No prompt template exists for the requested key
    #[error("prompt template '{key}' not found")]
    PromptMissing { key: String },

    /// The schedule names a generator this build does not know
    #[error("unsupported generator '{name}'")]
    UnknownGenerator { name: String },
}

impl GenerationError {
    /// Provider failure helper.
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

/// Text plus the usage metadata the source's notes column records.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub tokens: u64,
    pub cost: f64,
}

/// A text/image generation backend.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Canonical provider name ("openai", "yandex")
    fn name(&self) -> &'static str;

    /// Generate post text for a rendered prompt.
    async fn generate_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, GenerationError>;

    /// Generate an illustration; providers without image models return
    /// [`GenerationError::NotSupported`].
    async fn generate_image(&self, prompt: &str, model: &str) -> Result<Bytes, GenerationError>;
}

/// Map a configured generator name to its canonical provider name.
///
/// Accepts the aliases the original schedule format used.
pub fn canonical_name(name: &str) -> Result<&'static str, GenerationError> {
    match name.trim().to_lowercase().as_str() {
        "openai" | "chatgpt" => Ok("openai"),
        "yandex" | "yandexgpt" => Ok("yandex"),
        _ => Err(GenerationError::UnknownGenerator {
            name: name.to_string(),
        }),
    }
}
