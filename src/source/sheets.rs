//! Google Sheets adapter for the content source
//!
//! Work items live as rows in one worksheet. The first row is a header; the
//! adapter resolves columns by name so operators can reorder the sheet
//! freely. Required columns: `idea`, `status`. Recognized optional columns:
//! `prompt_key`, `channels`, `scheduled`, `url`, `ai`, `model`, `notes`.
//!
//! The values API has no compare-and-swap, so claims are serialized behind
//! an in-process lock and the status cell is re-read right before the
//! Processing transition. Cross-process exclusivity is a deployment concern.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{ClaimError, ContentSource, FinalizeError};
use crate::config::SheetsConfig;
use crate::models::{RunSummary, WorkItem, WorkItemStatus};

/// Response/request body of the values API.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<String>,

    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest {
    value_input_option: &'static str,
    data: Vec<ValueRange>,
}

/// Header positions resolved by column name (0-based).
#[derive(Debug)]
struct HeaderMap {
    columns: Vec<String>,
    status: usize,
    idea: usize,
}

impl HeaderMap {
    fn parse(header: &[String]) -> Result<Self, String> {
        let columns: Vec<String> = header.iter().map(|c| c.trim().to_lowercase()).collect();
        let find = |name: &str| columns.iter().position(|c| c == name);

        let status = find("status").ok_or("header has no 'status' column")?;
        let idea = find("idea").ok_or("header has no 'idea' column")?;
        Ok(Self {
            columns,
            status,
            idea,
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Convert a 0-based column index to an A1 column letter ("A", "Z", "AA").
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ASCII letters")
}

/// Content source over the Google Sheets values REST API.
pub struct SheetsSource {
    client: Client,
    config: SheetsConfig,
    // serializes claims within this process; the values API cannot CAS
    claim_lock: Mutex<()>,
}

impl SheetsSource {
    /// Create a source for the configured spreadsheet and worksheet.
    pub fn new(config: SheetsConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config,
            claim_lock: Mutex::new(()),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.config.api_base, self.config.spreadsheet_id, range
        )
    }

    async fn fetch_range(&self, range: &str) -> Result<ValueRange, String> {
        let response = self
            .client
            .get(self.values_url(range))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| format!("values get failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("values get failed: {e}"))?;

        response
            .json::<ValueRange>()
            .await
            .map_err(|e| format!("values get returned malformed body: {e}"))
    }

    async fn write_cell(&self, row: u64, column: usize, value: &str) -> Result<(), String> {
        let range = format!("{}!{}{}", self.config.worksheet, column_letter(column), row);
        let body = ValueRange {
            range: Some(range.clone()),
            values: vec![vec![value.to_string()]],
        };

        self.client
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("values update failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("values update failed: {e}"))?;
        Ok(())
    }

    fn parse_item(&self, header: &HeaderMap, row_index: u64, row: &[String]) -> WorkItem {
        let cell = |index: usize| row.get(index).map(|v| v.trim()).unwrap_or("");

        let prompt_key = header
            .index_of("prompt_key")
            .map(cell)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let channels = header
            .index_of("channels")
            .map(cell)
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.split(',')
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty());

        WorkItem {
            row: row_index,
            idea: cell(header.idea).to_string(),
            status: WorkItemStatus::Processing,
            prompt_key,
            channels,
        }
    }
}

#[async_trait]
impl ContentSource for SheetsSource {
    async fn claim_next_pending(&self) -> Result<WorkItem, ClaimError> {
        let _guard = self.claim_lock.lock().await;

        let sheet = self
            .fetch_range(&self.config.worksheet)
            .await
            .map_err(|reason| ClaimError::Source { reason })?;

        if sheet.values.len() < 2 {
            return Err(ClaimError::NoPending);
        }

        let header = HeaderMap::parse(&sheet.values[0])
            .map_err(|reason| ClaimError::Source { reason })?;

        for (offset, row) in sheet.values[1..].iter().enumerate() {
            let row_index = offset as u64 + 2; // 1-based, after the header
            let status = row
                .get(header.status)
                .and_then(|v| v.parse::<WorkItemStatus>().ok());
            if status != Some(WorkItemStatus::Pending) {
                continue;
            }

            // re-read the status cell before transitioning: another process
            // may have claimed the row since the full fetch
            let range = format!(
                "{}!{}{}",
                self.config.worksheet,
                column_letter(header.status),
                row_index
            );
            let current = self
                .fetch_range(&range)
                .await
                .map_err(|reason| ClaimError::Source { reason })?;
            let still_pending = current
                .values
                .first()
                .and_then(|r| r.first())
                .and_then(|v| v.parse::<WorkItemStatus>().ok())
                == Some(WorkItemStatus::Pending);
            if !still_pending {
                tracing::debug!(row = row_index, "Row claimed elsewhere, scanning on");
                continue;
            }

            self.write_cell(row_index, header.status, WorkItemStatus::Processing.as_str())
                .await
                .map_err(|reason| ClaimError::Source { reason })?;

            tracing::info!(row = row_index, "Claimed work item");
            return Ok(self.parse_item(&header, row_index, row));
        }

        Err(ClaimError::NoPending)
    }

    async fn finalize(&self, row: u64, summary: &RunSummary) -> Result<(), FinalizeError> {
        let header_range = format!("{}!1:1", self.config.worksheet);
        let header_row = self
            .fetch_range(&header_range)
            .await
            .map_err(|reason| FinalizeError { row, reason })?;
        let header = header_row
            .values
            .first()
            .ok_or_else(|| FinalizeError {
                row,
                reason: "worksheet has no header row".to_string(),
            })
            .and_then(|h| {
                HeaderMap::parse(h).map_err(|reason| FinalizeError { row, reason })
            })?;

        let fields: [(&str, String); 6] = [
            ("status", summary.status.to_string()),
            (
                "scheduled",
                summary.completed_at.format("%d.%m.%Y %H:%M:%S").to_string(),
            ),
            ("url", summary.url.clone().unwrap_or_default()),
            ("ai", summary.generator.clone()),
            ("model", summary.model.clone()),
            ("notes", summary.notes.clone()),
        ];

        let mut data = Vec::new();
        for (name, value) in fields {
            let Some(column) = header.index_of(name) else {
                tracing::warn!(column = name, "Worksheet header has no such column, skipping");
                continue;
            };
            data.push(ValueRange {
                range: Some(format!(
                    "{}!{}{}",
                    self.config.worksheet,
                    column_letter(column),
                    row
                )),
                values: vec![vec![value]],
            });
        }

        let body = BatchUpdateRequest {
            value_input_option: "RAW",
            data,
        };
        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.config.api_base, self.config.spreadsheet_id
        );

        self.client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FinalizeError {
                row,
                reason: format!("batch update failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| FinalizeError {
                row,
                reason: format!("batch update failed: {e}"),
            })?;

        tracing::info!(row, status = %summary.status, "Finalized work item");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(52), "BA");
    }

    #[test]
    fn test_header_map_requires_status_and_idea() {
        let header = vec!["Idea".to_string(), " Status ".to_string(), "url".to_string()];
        let map = HeaderMap::parse(&header).unwrap();
        assert_eq!(map.idea, 0);
        assert_eq!(map.status, 1);
        assert_eq!(map.index_of("url"), Some(2));
        assert_eq!(map.index_of("notes"), None);

        let bad = vec!["idea".to_string()];
        assert!(HeaderMap::parse(&bad).is_err());
    }

    #[test]
    fn test_parse_item_optional_columns() {
        let header = HeaderMap::parse(&[
            "idea".to_string(),
            "status".to_string(),
            "prompt_key".to_string(),
            "channels".to_string(),
        ])
        .unwrap();
        let source = SheetsSource::new(crate::config::SheetsConfig {
            api_base: "http://localhost".to_string(),
            spreadsheet_id: "s".to_string(),
            worksheet: "posts".to_string(),
            token: "t".to_string(),
        })
        .unwrap();

        let item = source.parse_item(
            &header,
            4,
            &[
                "announce feature X".to_string(),
                "pending".to_string(),
                "weekly".to_string(),
                "vk, Telegram".to_string(),
            ],
        );

        assert_eq!(item.row, 4);
        assert_eq!(item.idea, "announce feature X");
        assert_eq!(item.prompt_key.as_deref(), Some("weekly"));
        assert_eq!(
            item.channels,
            Some(vec!["vk".to_string(), "telegram".to_string()])
        );

        let bare = source.parse_item(
            &header,
            5,
            &["idea only".to_string(), "pending".to_string()],
        );
        assert!(bare.prompt_key.is_none());
        assert!(bare.channels.is_none());
    }
}
