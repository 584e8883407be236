use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::json;

use crate::config::WorkbookConfig;
use crate::core::spreadsheet::{AppendError, UpstreamResponse, WorkbookClient};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Workbook client for an Excel file in the signed-in user's OneDrive.
/// It exposes only the worksheet calls the appender needs.
pub struct GraphWorkbookClient {
    client: Client,
    worksheet_url: String,
}

impl GraphWorkbookClient {
    pub fn new(client: Client, config: &WorkbookConfig) -> Self {
        Self {
            client,
            worksheet_url: worksheet_url(&config.file_name, &config.worksheet),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<UpstreamResponse, AppendError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppendError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            tracing::debug!(status, "Graph returned an error: {}", body);
        }

        Ok(UpstreamResponse { status, body })
    }
}

/// Percent-encodes each path segment of the drive-relative file name.
fn encode_drive_path(file_name: &str) -> String {
    file_name
        .trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Quoted OData key, with embedded quotes doubled. Non-ASCII characters are
/// percent-encoded by the URL parser when the request is built.
fn odata_key(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn worksheet_url(file_name: &str, worksheet: &str) -> String {
    format!(
        "{GRAPH_BASE}/me/drive/root:/{}:/workbook/worksheets({})",
        encode_drive_path(file_name),
        odata_key(worksheet)
    )
}

#[async_trait]
impl WorkbookClient for GraphWorkbookClient {
    async fn used_range(&self, token: &str) -> Result<UpstreamResponse, AppendError> {
        let url = format!("{}/usedRange", self.worksheet_url);
        self.send(self.client.get(url).bearer_auth(token)).await
    }

    async fn write_range(
        &self,
        token: &str,
        address: &str,
        values: &[Vec<String>],
    ) -> Result<UpstreamResponse, AppendError> {
        let url = format!("{}/range(address={})", self.worksheet_url, odata_key(address));
        self.send(
            self.client
                .patch(url)
                .bearer_auth(token)
                .json(&json!({ "values": values })),
        )
        .await
    }

    async fn add_table_rows(
        &self,
        token: &str,
        table: &str,
        values: &[Vec<String>],
    ) -> Result<UpstreamResponse, AppendError> {
        let url = format!("{}/tables({})/rows", self.worksheet_url, odata_key(table));
        self.send(
            self.client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "values": values })),
        )
        .await
    }

    async fn read_range(&self, token: &str, address: &str) -> Result<UpstreamResponse, AppendError> {
        let url = format!("{}/range(address={})", self.worksheet_url, odata_key(address));
        self.send(self.client.get(url).bearer_auth(token)).await
    }
}
