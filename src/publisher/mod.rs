//! Social channel publishers
//!
//! Each channel implements the [`ChannelPublisher`] capability: take the
//! generated text (and optional image) and return the external post id.
//! Channels are independent; the orchestrator attempts every enabled one
//! and aggregates outcomes, a failure never short-circuits a sibling.

pub mod telegram;
pub mod vk;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use telegram::TelegramPublisher;
pub use vk::VkPublisher;

/// Error from one channel's publish attempt.
#[derive(Debug, Clone, Error)]
#[error("publish to {channel} failed: {reason}")]
pub struct PublishError {
    pub channel: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// A social network publishing target.
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    /// Channel name as used in configuration ("vk", "telegram")
    fn channel(&self) -> &'static str;

    /// Publish the post, returning the external post id or URL.
    async fn publish(&self, text: &str, image: Option<&Bytes>) -> Result<String, PublishError>;
}
