//! Vector archive of published posts
//!
//! Every successfully published post is stored with its metadata so later
//! runs can pull a recent post for the same channel as a style example.
//! Archiving is strictly best-effort: the orchestrator records a degradation
//! and moves on when a call here fails.
//!
//! The production backend is a Chroma server; the collection is resolved
//! once with `get_or_create` and the id is reused for the process lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::ArchiveConfig;

/// Error from an archive call.
#[derive(Debug, Clone, Error)]
#[error("archive error: {reason}")]
pub struct ArchiveError {
    pub reason: String,
}

impl ArchiveError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One archived post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Unique entry id
    pub id: String,

    /// Post text as published
    pub content: String,

    /// Channel the post went to ("vk", "telegram")
    pub channel: String,

    /// External post id or URL
    pub url: String,

    /// Model that generated the text
    pub model: String,

    /// When the post was published
    pub created_at: DateTime<Utc>,
}

impl ArchiveEntry {
    /// New entry for a just-published post.
    pub fn new(
        content: impl Into<String>,
        channel: impl Into<String>,
        url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            channel: channel.into(),
            url: url.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Post history store.
#[async_trait]
pub trait VectorArchive: Send + Sync {
    /// Store one published post.
    async fn store(&self, entry: &ArchiveEntry) -> Result<(), ArchiveError>;

    /// Most recent archived post text for a channel, if any.
    async fn last_for_channel(&self, channel: &str) -> Result<Option<String>, ArchiveError>;
}

// ============================================================================
// Chroma backend
// ============================================================================

#[derive(Debug, Deserialize)]
struct Collection {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    documents: Vec<String>,
    #[serde(default)]
    metadatas: Vec<serde_json::Value>,
}

/// Archive over the Chroma HTTP API.
pub struct ChromaArchive {
    client: Client,
    config: ArchiveConfig,
    collection_id: OnceCell<String>,
}

impl ChromaArchive {
    pub fn new(config: ArchiveConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config,
            collection_id: OnceCell::new(),
        })
    }

    /// Resolve the collection id, creating the collection on first use.
    async fn collection_id(&self) -> Result<&str, ArchiveError> {
        self.collection_id
            .get_or_try_init(|| async {
                let collection: Collection = self
                    .client
                    .post(format!("{}/api/v1/collections", self.config.url))
                    .json(&json!({
                        "name": self.config.collection,
                        "get_or_create": true,
                    }))
                    .send()
                    .await
                    .map_err(|e| ArchiveError::new(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| ArchiveError::new(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| ArchiveError::new(format!("malformed collection: {e}")))?;
                Ok(collection.id)
            })
            .await
            .map(String::as_str)
    }
}

#[async_trait]
impl VectorArchive for ChromaArchive {
    async fn store(&self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        let collection_id = self.collection_id().await?;

        self.client
            .post(format!(
                "{}/api/v1/collections/{collection_id}/add",
                self.config.url
            ))
            .json(&json!({
                "ids": [entry.id],
                "documents": [entry.content],
                "metadatas": [{
                    "network": entry.channel,
                    "url": entry.url,
                    "model": entry.model,
                    "created_at": entry.created_at.timestamp(),
                }],
            }))
            .send()
            .await
            .map_err(|e| ArchiveError::new(e.to_string()))?
            .error_for_status()
            .map_err(|e| ArchiveError::new(e.to_string()))?;

        tracing::debug!(id = %entry.id, channel = %entry.channel, "Archived post");
        Ok(())
    }

    async fn last_for_channel(&self, channel: &str) -> Result<Option<String>, ArchiveError> {
        let collection_id = self.collection_id().await?;

        let response: GetResponse = self
            .client
            .post(format!(
                "{}/api/v1/collections/{collection_id}/get",
                self.config.url
            ))
            .json(&json!({
                "where": { "network": channel },
                "include": ["documents", "metadatas"],
            }))
            .send()
            .await
            .map_err(|e| ArchiveError::new(e.to_string()))?
            .error_for_status()
            .map_err(|e| ArchiveError::new(e.to_string()))?
            .json()
            .await
            .map_err(|e| ArchiveError::new(format!("malformed get response: {e}")))?;

        Ok(newest_document(response.documents, &response.metadatas))
    }
}

/// Pick the document whose metadata carries the greatest `created_at`.
fn newest_document(documents: Vec<String>, metadatas: &[serde_json::Value]) -> Option<String> {
    documents
        .into_iter()
        .enumerate()
        .max_by_key(|(i, _)| {
            metadatas
                .get(*i)
                .and_then(|m| m.get("created_at"))
                .and_then(|v| v.as_i64())
                .unwrap_or(i64::MIN)
        })
        .map(|(_, doc)| doc)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_entry_gets_unique_ids() {
        let a = ArchiveEntry::new("text", "vk", "vk_1", "gpt-4o");
        let b = ArchiveEntry::new("text", "vk", "vk_2", "gpt-4o");
        assert_ne!(a.id, b.id);
        assert_eq!(a.channel, "vk");
    }

    #[test]
    fn test_newest_document_by_created_at() {
        let documents = vec!["old".to_string(), "new".to_string(), "mid".to_string()];
        let metadatas = vec![
            json!({"created_at": 100}),
            json!({"created_at": 300}),
            json!({"created_at": 200}),
        ];
        assert_eq!(
            newest_document(documents, &metadatas),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_newest_document_empty() {
        assert_eq!(newest_document(Vec::new(), &[]), None);
    }

    #[test]
    fn test_newest_document_missing_metadata_loses() {
        let documents = vec!["bare".to_string(), "dated".to_string()];
        let metadatas = vec![json!({}), json!({"created_at": 1})];
        assert_eq!(
            newest_document(documents, &metadatas),
            Some("dated".to_string())
        );
    }
}
