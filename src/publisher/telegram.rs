//! Telegram channel publisher
//!
//! Publishes the photo first (when present), then the text message with
//! Markdown formatting, and returns the `t.me` URL of the text message.
//! Building that URL requires the chat to have a public username.
//!
//! Generated text arrives with `**bold**` markers; Telegram's legacy
//! Markdown mode wants single asterisks, so the markers are downgraded
//! without touching `#` headings or anything else.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{ChannelPublisher, PublishError};
use crate::config::TelegramConfig;

const CHANNEL: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
}

/// Telegram Bot API publishing adapter.
pub struct TelegramPublisher {
    client: Client,
    config: TelegramConfig,
    bold_markers: Regex,
}

impl TelegramPublisher {
    pub fn new(config: TelegramConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            config,
            bold_markers: Regex::new(r"(?s)\*\*(.*?)\*\*").expect("static pattern"),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.config.api_base, self.config.token)
    }

    /// Downgrade `**bold**` to Telegram's single-asterisk Markdown.
    fn sanitize_markdown(&self, text: &str) -> String {
        self.bold_markers.replace_all(text, "*$1*").into_owned()
    }

    fn unwrap_envelope<T>(method: &str, envelope: ApiEnvelope<T>) -> Result<T, PublishError> {
        if !envelope.ok {
            return Err(PublishError::new(
                CHANNEL,
                format!(
                    "{method}: {}",
                    envelope.description.unwrap_or_else(|| "unknown error".to_string())
                ),
            ));
        }
        envelope
            .result
            .ok_or_else(|| PublishError::new(CHANNEL, format!("{method}: empty result")))
    }

    async fn chat_username(&self) -> Result<String, PublishError> {
        let envelope: ApiEnvelope<Chat> = self
            .client
            .get(self.method_url("getChat"))
            .query(&[("chat_id", self.config.chat_id.as_str())])
            .send()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("getChat: {e}")))?
            .json()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("getChat: malformed body: {e}")))?;

        let chat = Self::unwrap_envelope("getChat", envelope)?;
        chat.username.ok_or_else(|| {
            PublishError::new(
                CHANNEL,
                format!("chat {} has no public username", self.config.chat_id),
            )
        })
    }

    async fn send_photo(&self, image: &Bytes) -> Result<(), PublishError> {
        let part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PublishError::new(CHANNEL, format!("sendPhoto: {e}")))?;
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .part("photo", part);

        let envelope: ApiEnvelope<Message> = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("sendPhoto: {e}")))?
            .json()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("sendPhoto: malformed body: {e}")))?;

        Self::unwrap_envelope("sendPhoto", envelope).map(|_| ())
    }

    async fn send_message(&self, text: &str) -> Result<i64, PublishError> {
        let envelope: ApiEnvelope<Message> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| PublishError::new(CHANNEL, format!("sendMessage: {e}")))?
            .json()
            .await
            .map_err(|e| {
                PublishError::new(CHANNEL, format!("sendMessage: malformed body: {e}"))
            })?;

        Self::unwrap_envelope("sendMessage", envelope).map(|m| m.message_id)
    }
}

#[async_trait]
impl ChannelPublisher for TelegramPublisher {
    fn channel(&self) -> &'static str {
        CHANNEL
    }

    async fn publish(&self, text: &str, image: Option<&Bytes>) -> Result<String, PublishError> {
        let username = self.chat_username().await?;

        if let Some(image) = image {
            self.send_photo(image).await?;
        }

        let message_id = self.send_message(&self.sanitize_markdown(text)).await?;
        let url = format!("https://t.me/{username}/{message_id}");
        tracing::info!(url = %url, "Published to Telegram");
        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
