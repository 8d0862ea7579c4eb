//! Content source: where pending work items come from
//!
//! The orchestrator talks to the source through the narrow [`ContentSource`]
//! interface: claim the next pending item (atomically, so racing runs cannot
//! both take it) and write the final status back. The production
//! implementation is [`SheetsSource`] over the Google Sheets values API.

pub mod sheets;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RunSummary, WorkItem};

pub use sheets::SheetsSource;

/// Errors from the Claiming step.
///
/// `NoPending` and `RaceLost` are expected outcomes, not user-visible
/// failures; the run ends as a no-op.
#[derive(Debug, Clone, Error)]
pub enum ClaimError {
    /// No row with status = pending exists
    #[error("no pending work item")]
    NoPending,

    /// Another run claimed the row between observation and transition
    #[error("claim race lost for row {row}")]
    RaceLost { row: u64 },

    /// The source itself could not be reached or read
    #[error("content source unavailable: {reason}")]
    Source { reason: String },
}

impl ClaimError {
    /// True when the run should end as a quiet no-op.
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoPending | Self::RaceLost { .. })
    }
}

/// Error from the Finalizing status writeback.
///
/// Surfaced to the run's caller; the in-memory run result is still returned
/// so manual remediation stays possible.
#[derive(Debug, Clone, Error)]
#[error("finalize failed for row {row}: {reason}")]
pub struct FinalizeError {
    pub row: u64,
    pub reason: String,
}

/// Supplier of work items and recorder of their outcomes.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Claim the next pending work item, transitioning it to Processing.
    ///
    /// The transition is atomic from the orchestrator's point of view: if
    /// two runs race, exactly one observes a successful claim.
    async fn claim_next_pending(&self) -> Result<WorkItem, ClaimError>;

    /// Write the final status and run summary back to the item's row.
    async fn finalize(&self, row: u64, summary: &RunSummary) -> Result<(), FinalizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_error_no_op_classification() {
        assert!(ClaimError::NoPending.is_no_op());
        assert!(ClaimError::RaceLost { row: 3 }.is_no_op());
        assert!(!ClaimError::Source {
            reason: "timeout".to_string()
        }
        .is_no_op());
    }
}
