//! Core data structures for the post pipeline
//!
//! The types here model one unit of spreadsheet-driven work (`WorkItem`),
//! the content produced for it (`GenerationResult`), the per-channel
//! publishing results (`PublishOutcome`) and the aggregate result of a
//! single orchestrator run (`RunOutcome`).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Work Item
// ============================================================================

/// Lifecycle status of a work item row in the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    /// Waiting to be picked up by a run
    Pending,
    /// Claimed by a run; no other run may pick it up
    Processing,
    /// At least one channel publish succeeded
    Published,
    /// Text generation or every enabled channel failed
    Failed,
}

impl WorkItemStatus {
    /// Status string as written to the content source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown work item status '{other}'")),
        }
    }
}

/// One row of pending content work claimed from the content source.
///
/// Created externally (appended to the spreadsheet); the orchestrator only
/// transitions its status, it never deletes the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based row reference in the source sheet
    pub row: u64,

    /// Free-text prompt seed
    pub idea: String,

    /// Current lifecycle status
    pub status: WorkItemStatus,

    /// Optional per-item template override (takes precedence over the
    /// schedule's prompt_key)
    pub prompt_key: Option<String>,

    /// Optional per-item channel restriction
    pub channels: Option<Vec<String>>,
}

impl WorkItem {
    /// Create a pending item with just a row and an idea.
    pub fn pending(row: u64, idea: impl Into<String>) -> Self {
        Self {
            row,
            idea: idea.into(),
            status: WorkItemStatus::Pending,
            prompt_key: None,
            channels: None,
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Model parameters for one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Model identifier, e.g. "gpt-4o" or "yandexgpt-lite"
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,
}

/// Immutable result of one generation step, cached by request key.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated post text
    pub text: String,

    /// Generated illustration, if an image provider is configured and succeeded
    pub image: Option<Bytes>,

    /// Text provider that produced the result
    pub provider: String,

    /// Model identifier used
    pub model: String,

    /// Sampling temperature used
    pub temperature: f32,

    /// Total tokens reported by the provider
    pub tokens: u64,

    /// Estimated cost derived from usage
    pub cost: f64,
}

impl GenerationResult {
    /// Summary line written into the source's notes column.
    pub fn notes(&self) -> String {
        format!("tokens={},cost={}", self.tokens, self.cost)
    }
}

// ============================================================================
// Publishing
// ============================================================================

/// Per-channel result of the Publishing step.
///
/// A run produces exactly one outcome per enabled channel; outcomes are
/// collected, never partially discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Channel name ("vk", "telegram", ...)
    pub channel: String,

    /// Whether the publish call succeeded
    pub success: bool,

    /// External post id or URL on success
    pub post_id: Option<String>,

    /// Error detail on failure
    pub error: Option<String>,
}

impl PublishOutcome {
    /// Successful publish with the external post id.
    pub fn ok(channel: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: true,
            post_id: Some(post_id.into()),
            error: None,
        }
    }

    /// Failed publish with the error detail.
    pub fn failed(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: false,
            post_id: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Schedules
// ============================================================================

fn default_enabled() -> bool {
    true
}

fn default_generator() -> String {
    "openai".to_string()
}

/// One schedule definition loaded from configuration at process start.
///
/// The set of definitions is immutable for the process lifetime; the
/// `enabled` flag gates whether a definition fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// Unique definition id, e.g. "vk_morning_post"
    pub id: String,

    /// Optional publish-target restriction; a run triggered by a schedule
    /// with `module = "vk"` only publishes to VK
    #[serde(default)]
    pub module: Option<String>,

    /// Cron expression (classic 5-field crontab or 6-field with seconds)
    pub cron: String,

    /// Prompt template key looked up in the configured prompts
    pub prompt_key: String,

    /// Text generator name ("openai" / "chatgpt" / "yandex" / "yandexgpt")
    #[serde(default = "default_generator")]
    pub generator: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// ============================================================================
// Run results
// ============================================================================

/// Final classification of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No pending item (or the claim race was lost); nothing was mutated
    Skipped,
    /// At least one enabled channel publish succeeded
    Published,
    /// Text generation failed or every enabled channel failed
    Failed,
}

/// Summary written back to the content source during Finalizing.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Final item status (Published or Failed)
    pub status: WorkItemStatus,

    /// When the run finished
    pub completed_at: DateTime<Utc>,

    /// First successful external post id/URL, if any
    pub url: Option<String>,

    /// Text generator name used
    pub generator: String,

    /// Model identifier used
    pub model: String,

    /// Free-form notes ("tokens=N,cost=C" or the failure detail)
    pub notes: String,
}

/// Structured result of one orchestrator run.
///
/// Errors are recorded here rather than propagated: the scheduler only ever
/// observes a `RunOutcome`, never an unwound error.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Id of the schedule (or "immediate") that triggered the run
    pub schedule_id: String,

    /// Final classification
    pub status: RunStatus,

    /// Claimed row, if the run got past Claiming
    pub row: Option<u64>,

    /// One entry per enabled channel at run start
    pub outcomes: Vec<PublishOutcome>,

    /// Non-fatal degradations (image skipped, archive failed, ...)
    pub degraded: Vec<String>,

    /// Fatal error detail for Failed runs
    pub error: Option<String>,

    /// Error from the final status writeback, if it failed; the in-memory
    /// outcome is still returned so the caller can remediate manually
    pub finalize_error: Option<String>,
}

impl RunOutcome {
    /// A run that found no claimable item.
    pub fn skipped(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            status: RunStatus::Skipped,
            row: None,
            outcomes: Vec::new(),
            degraded: Vec::new(),
            error: None,
            finalize_error: None,
        }
    }

    /// True unless the run failed; a skipped run is not a failure.
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    /// True if anything non-fatal went wrong along the way.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// First successful external post id, if any channel succeeded.
    pub fn published_url(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.success)
            .and_then(|o| o.post_id.as_deref())
    }

    /// Process exit code for run-once mode.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
