//! Google Sheets REST client for single-cell reads and writes.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CredentialProvider, LedgerCells, send_authorized};
use crate::error::LedgerError;

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: [[String; 1]; 1],
}

/// Sheets API client bound to one spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Values endpoint for `range`, with the range percent-encoded as a path segment.
    fn values_url(&self, range: &str) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot be a base URL", self.base_url))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }
}

/// A1 range for one cell on a named sheet.
pub fn a1_range(sheet: &str, cell: &str) -> String {
    format!("'{}'!{cell}", sheet.replace('\'', "''"))
}

/// Render a cell value from the API as text; `None` for empty cells.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl LedgerCells for SheetsClient {
    async fn read_cell(&self, sheet: &str, cell: &str) -> Result<Option<String>, LedgerError> {
        let read_err = |reason: String| LedgerError::Read {
            sheet: sheet.to_string(),
            cell: cell.to_string(),
            reason,
        };

        let range = a1_range(sheet, cell);
        let url = self.values_url(&range).map_err(read_err)?;
        let resp = send_authorized(self.credentials.as_ref(), |token| {
            self.http
                .get(url.clone())
                .bearer_auth(token)
                .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
        })
        .await
        .map_err(|e| read_err(e.to_string()))?;

        let body: ValueRange = resp.json().await.map_err(|e| read_err(e.to_string()))?;
        let value = body
            .values
            .first()
            .and_then(|row| row.first())
            .and_then(cell_text);
        debug!(range = %range, value = ?value, "Ledger cell read");
        Ok(value)
    }

    async fn write_cell(&self, sheet: &str, cell: &str, value: Decimal) -> Result<(), LedgerError> {
        let write_err = |reason: String| LedgerError::Write {
            sheet: sheet.to_string(),
            cell: cell.to_string(),
            reason,
        };

        let range = a1_range(sheet, cell);
        let url = self.values_url(&range).map_err(write_err)?;
        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [[value.to_string()]],
        };
        send_authorized(self.credentials.as_ref(), |token| {
            self.http
                .put(url.clone())
                .bearer_auth(token)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&body)
        })
        .await
        .map_err(|e| write_err(e.to_string()))?;

        debug!(range = %range, value = %value, "Ledger cell written");
        Ok(())
    }
}
