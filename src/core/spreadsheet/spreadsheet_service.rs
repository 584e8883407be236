use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::auth::{AccessTokenSource, AuthError};
use crate::core::shipment::ShipmentRecord;

#[derive(Debug, Error)]
pub enum AppendError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Unable to detect used range ({status})")]
    RangeLookupFailed { status: u16, details: String },
    #[error("Failed to write to workbook ({status})")]
    WriteFailed { status: u16, body: String },
    #[error("Failed to read workbook range ({status})")]
    ReadFailed { status: u16, body: String },
    #[error("Row has no cells")]
    InvalidRow,
    #[error("Workbook API unreachable: {0}")]
    Transport(String),
}

/// Raw status and body of a workbook API call; interpretation is up to the service.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The workbook calls needed to append rows to one worksheet.
#[async_trait]
pub trait WorkbookClient: Send + Sync {
    async fn used_range(&self, token: &str) -> Result<UpstreamResponse, AppendError>;
    async fn write_range(
        &self,
        token: &str,
        address: &str,
        values: &[Vec<String>],
    ) -> Result<UpstreamResponse, AppendError>;
    async fn add_table_rows(
        &self,
        token: &str,
        table: &str,
        values: &[Vec<String>],
    ) -> Result<UpstreamResponse, AppendError>;
    async fn read_range(&self, token: &str, address: &str) -> Result<UpstreamResponse, AppendError>;
}

/// How a new row finds its place in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendStrategy {
    /// Look up the used range and write to the row below it.
    DirectRange,
    /// Let the named table append the row itself.
    TableRow { table: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub range: String,
    pub status: u16,
}

#[derive(Deserialize)]
struct UsedRange {
    address: Option<String>,
}

/// Last occupied row of a used-range address such as `Sheet!A1:G23`.
pub fn last_row_of(address: &str) -> Option<u32> {
    let cells = address.rsplit_once('!').map_or(address, |(_, cells)| cells);
    let bottom_right = cells.rsplit(':').next()?;
    let row: String = bottom_right
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic() || *c == '$')
        .collect();
    row.parse().ok()
}

/// Spreadsheet column letters for a 1-based column number (1 → A, 27 → AA).
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        column -= 1;
        letters.push(char::from(b'A' + (column % 26) as u8));
        column /= 26;
    }
    letters.iter().rev().collect()
}

/// Range covering `width` cells of a single row, starting at column A.
pub fn row_range(row: u32, width: usize) -> String {
    format!("A{row}:{}{row}", column_letter(width.max(1)))
}

/// Writes shipment rows into the configured workbook.
pub struct SpreadsheetAppender {
    workbook: Arc<dyn WorkbookClient>,
    tokens: Arc<dyn AccessTokenSource>,
    strategy: AppendStrategy,
}

impl SpreadsheetAppender {
    pub fn new(
        workbook: Arc<dyn WorkbookClient>,
        tokens: Arc<dyn AccessTokenSource>,
        strategy: AppendStrategy,
    ) -> Self {
        Self {
            workbook,
            tokens,
            strategy,
        }
    }

    /// Authenticates with the stored credentials and appends the record.
    pub async fn append(&self, record: &ShipmentRecord) -> Result<AppendOutcome, AppendError> {
        let token = self.tokens.access_token().await?;
        let values = record.to_row();

        match &self.strategy {
            AppendStrategy::DirectRange => self.write_next_row(&token, values).await,
            AppendStrategy::TableRow { table } => self.add_table_row(&token, table, values).await,
        }
    }

    /// Request-path append: every failure is returned to the caller.
    pub async fn append_or_fail(
        &self,
        record: &ShipmentRecord,
    ) -> Result<AppendOutcome, AppendError> {
        match self.append(record).await {
            Ok(outcome) => {
                tracing::info!(range = %outcome.range, "Shipment row appended");
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("Shipment row append failed: {}", e);
                Err(e)
            }
        }
    }

    /// Best-effort append: failures are logged and swallowed.
    pub async fn append_or_log(&self, record: &ShipmentRecord) -> Option<AppendOutcome> {
        match self.append(record).await {
            Ok(outcome) => {
                tracing::info!(range = %outcome.range, "Shipment row appended");
                Some(outcome)
            }
            Err(AppendError::Auth(AuthError::TokenCacheMissing)) => {
                tracing::warn!("No stored token, skipping workbook upload");
                None
            }
            Err(e) => {
                tracing::error!("Workbook upload failed: {}", e);
                None
            }
        }
    }

    /// Writes an arbitrary row below the used range using a caller-supplied token.
    pub async fn append_values_with_token(
        &self,
        token: &str,
        row: Vec<String>,
    ) -> Result<AppendOutcome, AppendError> {
        if row.is_empty() {
            return Err(AppendError::InvalidRow);
        }
        self.write_next_row(token, row).await
    }

    /// Reads a range, using the stored credentials unless a token is given.
    pub async fn read_range(
        &self,
        token: Option<&str>,
        address: &str,
    ) -> Result<serde_json::Value, AppendError> {
        let token = match token {
            Some(t) => t.to_string(),
            None => self.tokens.access_token().await?,
        };

        let resp = self.workbook.read_range(&token, address).await?;
        if !resp.is_success() {
            return Err(AppendError::ReadFailed {
                status: resp.status,
                body: resp.body,
            });
        }

        Ok(serde_json::from_str(&resp.body).unwrap_or(serde_json::Value::String(resp.body)))
    }

    async fn write_next_row(
        &self,
        token: &str,
        row: Vec<String>,
    ) -> Result<AppendOutcome, AppendError> {
        let used = self.workbook.used_range(token).await?;
        let lookup_failed = || AppendError::RangeLookupFailed {
            status: used.status,
            details: used.body.clone(),
        };

        if !used.is_success() {
            return Err(lookup_failed());
        }

        let last_row = serde_json::from_str::<UsedRange>(&used.body)
            .ok()
            .and_then(|r| r.address)
            .as_deref()
            .and_then(last_row_of)
            .ok_or_else(lookup_failed)?;

        let target = row_range(last_row + 1, row.len());
        tracing::debug!(last_row, target = %target, "Writing row below used range");

        let resp = self.workbook.write_range(token, &target, &[row]).await?;
        if !resp.is_success() {
            return Err(AppendError::WriteFailed {
                status: resp.status,
                body: resp.body,
            });
        }

        Ok(AppendOutcome {
            range: target,
            status: resp.status,
        })
    }

    async fn add_table_row(
        &self,
        token: &str,
        table: &str,
        row: Vec<String>,
    ) -> Result<AppendOutcome, AppendError> {
        let resp = self.workbook.add_table_rows(token, table, &[row]).await?;
        if !resp.is_success() {
            return Err(AppendError::WriteFailed {
                status: resp.status,
                body: resp.body,
            });
        }

        Ok(AppendOutcome {
            range: format!("tables('{table}')"),
            status: resp.status,
        })
    }
}
