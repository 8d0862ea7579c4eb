//! OpenAI provider: chat completions for text, DALL·E for images
//!
//! The image endpoint is asked for a hosted URL and the bytes are fetched
//! in a second request, so the publishers receive raw image data.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ContentGenerator, GeneratedText, GenerationError};
use crate::config::OpenAiConfig;
use crate::models::GenerationParams;

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'static str,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: String,
}

/// Rough per-token pricing for the notes column; unknown models report 0.
fn estimate_cost(model: &str, tokens: u64) -> f64 {
    let per_1k = if model.starts_with("gpt-4o-mini") {
        0.0006
    } else if model.starts_with("gpt-4o") {
        0.0125
    } else {
        0.0
    };
    tokens as f64 / 1000.0 * per_1k
}

/// OpenAI generation adapter.
pub struct OpenAiGenerator {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, GenerationError> {
        let url = format!("{}/chat/completions", self.config.api_base);
        let request = ChatRequest {
            model: &params.model,
            temperature: params.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| {
                GenerationError::provider(PROVIDER, format!("malformed response: {e}"))
            })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GenerationError::provider(PROVIDER, "empty completion"))?;

        let tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok(GeneratedText {
            text,
            tokens,
            cost: estimate_cost(&params.model, tokens),
        })
    }

    async fn generate_image(&self, prompt: &str, model: &str) -> Result<Bytes, GenerationError> {
        let url = format!("{}/images/generations", self.config.api_base);
        let request = ImageRequest {
            model,
            prompt,
            n: 1,
            size: "1024x1024",
            response_format: "url",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, e.to_string()))?
            .json::<ImageResponse>()
            .await
            .map_err(|e| {
                GenerationError::provider(PROVIDER, format!("malformed response: {e}"))
            })?;

        let image_url = response
            .data
            .into_iter()
            .next()
            .map(|d| d.url)
            .ok_or_else(|| GenerationError::provider(PROVIDER, "no image in response"))?;

        self.client
            .get(&image_url)
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, format!("image download: {e}")))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, format!("image download: {e}")))?
            .bytes()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, format!("image download: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_cost_known_models() {
        assert!(estimate_cost("gpt-4o", 1000) > 0.0);
        assert!(estimate_cost("gpt-4o-mini", 1000) < estimate_cost("gpt-4o", 1000));
        assert_eq!(estimate_cost("some-future-model", 1000), 0.0);
        assert_eq!(estimate_cost("gpt-4o", 0), 0.0);
    }
}
