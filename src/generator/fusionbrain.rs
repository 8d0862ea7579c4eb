//! FusionBrain provider: image generation only
//!
//! Generation is asynchronous on the API side:
//!
//! 1. `GET /key/api/v1/pipelines` — list pipelines, take the first id
//! 2. `POST /key/api/v1/pipeline/run` — multipart with the pipeline id and
//!    a JSON params document, yielding a task uuid
//! 3. `GET /key/api/v1/pipeline/status/{uuid}` — poll until DONE or FAIL
//!
//! A finished task reports its files as either hosted URLs or base64
//! strings (optionally with a `data:image/...;base64,` prefix); both forms
//! are handled. Text generation reports NotSupported.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ContentGenerator, GeneratedText, GenerationError};
use crate::config::FusionBrainConfig;
use crate::models::GenerationParams;

const PROVIDER: &str = "fusionbrain";
const POLL_ATTEMPTS: u32 = 20;
const POLL_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Pipeline {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    result: Option<StatusResult>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    #[serde(default)]
    files: Vec<String>,
}

/// FusionBrain image generation adapter.
pub struct FusionBrainGenerator {
    client: Client,
    config: FusionBrainConfig,
}

impl FusionBrainGenerator {
    pub fn new(config: FusionBrainConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn key_url(&self, path: &str) -> String {
        format!("{}/key/api/v1/{path}", self.config.api_base)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, GenerationError> {
        self.client
            .get(url)
            .header("X-Key", format!("Key {}", self.config.api_key))
            .header("X-Secret", format!("Secret {}", self.config.secret_key))
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, format!("{what}: {e}")))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, format!("{what}: {e}")))?
            .json()
            .await
            .map_err(|e| {
                GenerationError::provider(PROVIDER, format!("{what}: malformed body: {e}"))
            })
    }

    async fn pipeline_id(&self) -> Result<String, GenerationError> {
        let pipelines: Vec<Pipeline> = self.get_json(&self.key_url("pipelines"), "pipelines").await?;
        pipelines
            .into_iter()
            .next()
            .map(|p| p.id)
            .ok_or_else(|| GenerationError::provider(PROVIDER, "no pipelines available"))
    }

    async fn submit(&self, prompt: &str, pipeline_id: &str) -> Result<String, GenerationError> {
        let params = json!({
            "type": "GENERATE",
            "numImages": 1,
            "width": 1024,
            "height": 1024,
            "generateParams": { "query": prompt },
        });
        let params_part = Part::text(params.to_string())
            .mime_str("application/json")
            .map_err(|e| GenerationError::provider(PROVIDER, format!("run: {e}")))?;
        let form = Form::new()
            .text("pipeline_id", pipeline_id.to_string())
            .part("params", params_part);

        let run: RunResponse = self
            .client
            .post(self.key_url("pipeline/run"))
            .header("X-Key", format!("Key {}", self.config.api_key))
            .header("X-Secret", format!("Secret {}", self.config.secret_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenerationError::provider(PROVIDER, format!("run: {e}")))?
            .error_for_status()
            .map_err(|e| GenerationError::provider(PROVIDER, format!("run: {e}")))?
            .json()
            .await
            .map_err(|e| {
                GenerationError::provider(PROVIDER, format!("run: malformed body: {e}"))
            })?;
        Ok(run.uuid)
    }

    async fn poll_until_done(&self, uuid: &str) -> Result<String, GenerationError> {
        let url = self.key_url(&format!("pipeline/status/{uuid}"));
        for _ in 0..POLL_ATTEMPTS {
            let status: StatusResponse = self.get_json(&url, "status").await?;
            match status.status.as_str() {
                "DONE" => {
                    return status
                        .result
                        .and_then(|r| r.files.into_iter().next())
                        .ok_or_else(|| {
                            GenerationError::provider(PROVIDER, "finished task has no files")
                        });
                }
                "FAIL" => {
                    return Err(GenerationError::provider(PROVIDER, "generation task failed"));
                }
                _ => tokio::time::sleep(POLL_DELAY).await,
            }
        }
        Err(GenerationError::provider(
            PROVIDER,
            format!("task not done after {POLL_ATTEMPTS} polls"),
        ))
    }

    async fn fetch_file(&self, entry: &str) -> Result<Bytes, GenerationError> {
        if entry.starts_with("http://") || entry.starts_with("https://") {
            return self
                .client
                .get(entry)
                .send()
                .await
                .map_err(|e| {
                    GenerationError::provider(PROVIDER, format!("image download: {e}"))
                })?
                .error_for_status()
                .map_err(|e| {
                    GenerationError::provider(PROVIDER, format!("image download: {e}"))
                })?
                .bytes()
                .await
                .map_err(|e| {
                    GenerationError::provider(PROVIDER, format!("image download: {e}"))
                });
        }
        decode_base64_entry(entry)
    }
}

/// Decode a base64 file entry, tolerating a `data:image/...;base64,` prefix.
fn decode_base64_entry(entry: &str) -> Result<Bytes, GenerationError> {
    let payload = match entry.to_lowercase().starts_with("data:") {
        true => entry.split_once(',').map(|(_, rest)| rest).unwrap_or(entry),
        false => entry,
    };
    BASE64
        .decode(payload.trim())
        .map(Bytes::from)
        .map_err(|e| GenerationError::provider(PROVIDER, format!("base64 decode: {e}")))
}

#[async_trait]
impl ContentGenerator for FusionBrainGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_text(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<GeneratedText, GenerationError> {
        Err(GenerationError::NotSupported {
            provider: PROVIDER.to_string(),
            capability: "text",
        })
    }

    async fn generate_image(&self, prompt: &str, _model: &str) -> Result<Bytes, GenerationError> {
        let pipeline_id = self.pipeline_id().await?;
        let uuid = self.submit(prompt, &pipeline_id).await?;
        let file = self.poll_until_done(&uuid).await?;
        let image = self.fetch_file(&file).await?;
        tracing::debug!(bytes = image.len(), "FusionBrain image generated");
        Ok(image)
    }
}
