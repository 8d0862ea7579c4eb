//! YandexGPT provider via the Yandex Cloud Foundation Models API
//!
//! Text only; image generation reports NotSupported so the orchestrator can
//! degrade to a text-only post instead of failing the run.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ContentGenerator, GeneratedText, GenerationError};
use crate::config::YandexConfig;
use crate::models::GenerationParams;

const PROVIDER: &str = "yandex";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    #[serde(default)]
    total_tokens: String,
}

/// YandexGPT generation adapter.
pub struct YandexGenerator {
    client: Client,
    config: YandexConfig,
}

impl YandexGenerator {
    pub fn new(config: YandexConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, config })
    }

    /// Model URI in the `gpt://<folder>/<model>/latest` form the API expects.
    fn model_uri(&self, model: &str) -> String {
        format!("gpt://{}/{}/latest", self.config.folder_id, model)
    }
}

#[async_trait]
impl ContentGenerator for YandexGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, GenerationError> {
        let url = format!(
            "{}/foundationModels/v1/completion",
            self.config.api_base
        );
        let request = CompletionRequest {
            model_uri: self.model_uri(&params.model),
            completion_options: CompletionOptions {
                temperature: params.temperature,
                max_tokens: 2000,
            },
            messages: vec![Message {
                role: "user",
                text: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Api-Key {}", self.config.api_key))
            .header("X-Yandex-Cloud-Folder-Id", &self.config.folder_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .json::<CompletionResponse>()
            .await
            .map_err(|e| {
                GenerationError::provider(PROVIDER, format!("malformed response: {e}"))
            })?;

        let text = response
            .result
            .alternatives
            .into_iter()
            .next()
            .map(|a| a.message.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GenerationError::provider(PROVIDER, "empty completion"))?;

        // the API reports usage counters as strings
        let tokens = response
            .result
            .usage
            .and_then(|u| u.total_tokens.parse().ok())
            .unwrap_or(0);

        Ok(GeneratedText {
            text,
            tokens,
            cost: 0.0,
        })
    }

    async fn generate_image(&self, _prompt: &str, _model: &str) -> Result<Bytes, GenerationError> {
        Err(GenerationError::NotSupported {
            provider: PROVIDER.to_string(),
            capability: "image",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> YandexConfig {
        YandexConfig {
            api_base: "https://llm.api.cloud.yandex.net".to_string(),
            api_key: "key".to_string(),
            folder_id: "folder123".to_string(),
            model: "yandexgpt-lite".to_string(),
            temperature: 0.6,
        }
    }

    #[test]
    fn test_model_uri() {
        let generator = YandexGenerator::new(test_config()).unwrap();
        assert_eq!(
            generator.model_uri("yandexgpt-lite"),
            "gpt://folder123/yandexgpt-lite/latest"
        );
    }

    #[tokio::test]
    async fn test_image_generation_not_supported() {
        let generator = YandexGenerator::new(test_config()).unwrap();
        let err = generator.generate_image("a cat", "any").await.unwrap_err();
        assert!(matches!(err, GenerationError::NotSupported { .. }));
    }
}
