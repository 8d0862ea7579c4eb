//! smmaker - spreadsheet-driven social media content pipeline
//!
//! Pulls pending post ideas from a spreadsheet, generates text (and
//! optionally an illustration) with an LLM provider, publishes to the
//! configured social channels, archives the post for later style examples
//! and writes the outcome back to the spreadsheet row.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration from environment and TOML
//! - [`models`] - Core data structures and run outcomes
//! - [`source`] - Content source (Google Sheets) claiming and writeback
//! - [`generator`] - Text/image generation providers (OpenAI, YandexGPT)
//! - [`publisher`] - Social channel publishers (VK, Telegram)
//! - [`archive`] - Vector archive of published posts
//! - [`cache`] - Generation deduplication cache
//! - [`orchestrator`] - The run state machine tying the stages together
//! - [`scheduler`] - Cron-driven run scheduling
//!
//! # Example
//!
//! ```no_run
//! use smmaker::config::Config;
//! use smmaker::orchestrator::{Orchestrator, RunContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     // let orchestrator = Orchestrator::builder()...build()?;
//!     // let outcome = orchestrator.run(&RunContext::immediate(&config)).await;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod orchestrator;
pub mod publisher;
pub mod scheduler;
pub mod source;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::{
        PublishOutcome, RunOutcome, RunStatus, RunSummary, ScheduleDefinition, WorkItem,
        WorkItemStatus,
    };
    pub use crate::orchestrator::{Orchestrator, RunContext};
    pub use crate::scheduler::{RunHandler, Scheduler};
}

// Direct re-exports for convenience
pub use models::{RunOutcome, RunStatus, WorkItem, WorkItemStatus};
