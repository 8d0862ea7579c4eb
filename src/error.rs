//! Unified error handling for the smmaker crate
//!
//! Each pipeline stage defines its own error type next to its module; this
//! module consolidates them into a single [`Error`] enum for callers that
//! cross stage boundaries, while the stages keep using their own types.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::archive::ArchiveError;
pub use crate::generator::GenerationError;
pub use crate::publisher::PublishError;
pub use crate::scheduler::SchedulerError;
pub use crate::source::{ClaimError, FinalizeError};

/// Unified error type for the smmaker crate
#[derive(Error, Debug)]
pub enum Error {
    /// Claiming a work item from the content source failed
    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    /// The final status writeback failed
    #[error("Finalize error: {0}")]
    Finalize(#[from] FinalizeError),

    /// Text or image generation failed
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A channel publish failed
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// The post archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Scheduler startup errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
