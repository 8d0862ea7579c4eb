//! VK wall publisher
//!
//! Posting with an illustration is a three-step flow against the VK API:
//!
//! 1. `photos.getWallUploadServer` — obtain a one-shot upload URL
//! 2. upload the image bytes to that URL (multipart)
//! 3. `photos.saveWallPhoto` — register the upload, yielding an attachment
//!
//! followed by `wall.post` with the text and the `photo{owner}_{id}`
//! attachment. Text-only posts go straight to `wall.post`. The returned
//! post id is `"{owner_id}_{post_id}"`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{ChannelPublisher, PublishError};
use crate::config::VkConfig;

const CHANNEL: &str = "vk";
const API_VERSION: &str = "5.131";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default = "Option::default")]
    response: Option<T>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct UploadServer {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    server: i64,
    photo: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct SavedPhoto {
    id: i64,
    owner_id: i64,
}

#[derive(Debug, Deserialize)]
struct WallPost {
    post_id: i64,
}

/// VK publishing adapter.
pub struct VkPublisher {
    client: Client,
    config: VkConfig,
}

impl VkPublisher {
    pub fn new(config: VkConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.config.api_base)
    }

    /// Unwrap the `{response}|{error}` envelope every VK method returns.
    async fn call_method<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, PublishError> {
        let mut query: Vec<(&str, String)> = vec![
            ("access_token", self.config.token.clone()),
            ("v", API_VERSION.to_string()),
        ];
        query.extend_from_slice(params);

        let envelope: ApiEnvelope<T> = self
            .client
            .get(self.method_url(method))
            .query(&query)
            .send()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("{method}: {e}")))?
            .error_for_status()
            .map_err(|e| PublishError::new(CHANNEL, format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("{method}: malformed body: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(PublishError::new(
                CHANNEL,
                format!("{method}: [{}] {}", error.error_code, error.error_msg),
            ));
        }
        envelope
            .response
            .ok_or_else(|| PublishError::new(CHANNEL, format!("{method}: empty response")))
    }

    /// Upload the image and return the wall attachment string.
    async fn upload_photo(&self, image: &Bytes) -> Result<String, PublishError> {
        let server: UploadServer = self
            .call_method(
                "photos.getWallUploadServer",
                &[("owner_id", self.config.owner_id.to_string())],
            )
            .await?;

        let part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PublishError::new(CHANNEL, format!("upload: {e}")))?;
        let form = Form::new().part("photo", part);

        let upload: UploadResult = self
            .client
            .post(&server.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("upload: {e}")))?
            .error_for_status()
            .map_err(|e| PublishError::new(CHANNEL, format!("upload: {e}")))?
            .json()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("upload: malformed body: {e}")))?;

        if upload.photo.is_empty() || upload.photo == "[]" {
            return Err(PublishError::new(
                CHANNEL,
                "upload server returned no photo data",
            ));
        }

        let saved: Vec<SavedPhoto> = self
            .call_method(
                "photos.saveWallPhoto",
                &[
                    ("owner_id", self.config.owner_id.to_string()),
                    ("server", upload.server.to_string()),
                    ("photo", upload.photo),
                    ("hash", upload.hash),
                ],
            )
            .await?;

        let photo = saved
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::new(CHANNEL, "saveWallPhoto returned no photos"))?;
        Ok(format!("photo{}_{}", photo.owner_id, photo.id))
    }

    async fn post_wall(
        &self,
        text: &str,
        attachment: Option<String>,
    ) -> Result<String, PublishError> {
        let mut params = vec![
            ("owner_id", self.config.owner_id.to_string()),
            ("from_group", "1".to_string()),
            ("message", text.to_string()),
        ];
        if let Some(attachment) = attachment {
            params.push(("attachments", attachment));
        }

        let posted: WallPost = self.call_method("wall.post", &params).await?;
        Ok(format!("{}_{}", self.config.owner_id, posted.post_id))
    }
}

#[async_trait]
impl ChannelPublisher for VkPublisher {
    fn channel(&self) -> &'static str {
        CHANNEL
    }

    async fn publish(&self, text: &str, image: Option<&Bytes>) -> Result<String, PublishError> {
        let attachment = match image {
            Some(image) => Some(self.upload_photo(image).await?),
            None => None,
        };
        let post_id = self.post_wall(text, attachment).await?;
        tracing::info!(post_id = %post_id, "Published to VK");
        Ok(post_id)
    }
}
