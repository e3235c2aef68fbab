//! Google Sheets ledger adapter
//!
//! Talks to the Sheets v4 `values` API with a bearer token. The first row of
//! a tab is the header row; trailing empty cells are omitted by the API, so
//! short rows are padded with empty strings.

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::domain::LedgerTable;
use crate::infrastructure::config::LedgerConfig;
use crate::infrastructure::ledger_client::{a1_reference, LedgerClient, LedgerError, LedgerResult, LedgerTab};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

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
    values: [[&'a str; 1]; 1],
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Authenticated Sheets client
#[derive(Debug, Clone)]
pub struct SheetsLedger {
    http: Client,
    api_base: Url,
    token: String,
}

impl SheetsLedger {
    pub fn new(api_base: &str, token: impl Into<String>) -> LedgerResult<Self> {
        let api_base = Url::parse(api_base).map_err(|e| LedgerError::Malformed {
            message: format!("invalid API base {}: {}", api_base, e),
        })?;
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("seance-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base,
            token: token.into(),
        })
    }

    /// Build from config, reading the token from the configured variable
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        let token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LedgerError::MissingToken {
                variable: config.access_token_env.clone(),
            })?;
        Self::new(&config.api_base, token)
    }

    fn endpoint(&self, spreadsheet: &str, tail: &[&str]) -> LedgerResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| LedgerError::Malformed {
                message: format!("API base {} cannot carry a path", self.api_base),
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet])
            .extend(tail);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> LedgerResult<Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        Err(LedgerError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait(?Send)]
impl LedgerClient for SheetsLedger {
    type Tab = SheetsTab;

    async fn open_tab(&self, spreadsheet: &str, tab: &str) -> LedgerResult<SheetsTab> {
        let mut url = self.endpoint(spreadsheet, &[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let meta: SpreadsheetMeta = self
            .send(self.http.get(url))
            .await?
            .json()
            .await
            .map_err(|e| LedgerError::Malformed { message: e.to_string() })?;

        if !meta.sheets.iter().any(|s| s.properties.title == tab) {
            return Err(LedgerError::TabNotFound {
                spreadsheet: spreadsheet.to_string(),
                tab: tab.to_string(),
            });
        }

        info!("Opened ledger tab '{}'", tab);
        Ok(SheetsTab {
            client: self.clone(),
            spreadsheet: spreadsheet.to_string(),
            tab: tab.to_string(),
        })
    }
}

/// Tab name as it appears in an A1 range
fn range_prefix(tab: &str) -> String {
    if tab.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        tab.to_string()
    } else {
        format!("'{}'", tab.replace('\'', "''"))
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// First row becomes headers; every later row maps header -> cell
fn table_from_values(values: &[Vec<Value>]) -> LedgerTable {
    let Some((header_row, data_rows)) = values.split_first() else {
        return LedgerTable::default();
    };

    let headers: Vec<String> = header_row.iter().map(|v| cell_text(v).trim().to_string()).collect();
    let rows = data_rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), row.get(i).map(cell_text).unwrap_or_default()))
                .collect::<HashMap<_, _>>()
        })
        .collect();

    LedgerTable { headers, rows }
}

pub struct SheetsTab {
    client: SheetsLedger,
    spreadsheet: String,
    tab: String,
}

#[async_trait(?Send)]
impl LedgerTab for SheetsTab {
    async fn read_all_rows(&self) -> LedgerResult<LedgerTable> {
        let range = range_prefix(&self.tab);
        let url = self.client.endpoint(&self.spreadsheet, &["values", &range])?;

        let value_range: ValueRange = self
            .client
            .send(self.client.http.get(url))
            .await?
            .json()
            .await
            .map_err(|e| LedgerError::Malformed { message: e.to_string() })?;

        let table = table_from_values(&value_range.values);
        debug!("Read {} ledger rows from '{}'", table.rows.len(), self.tab);
        Ok(table)
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> LedgerResult<()> {
        let range = format!("{}!{}", range_prefix(&self.tab), a1_reference(row, column)?);
        let mut url = self.client.endpoint(&self.spreadsheet, &["values", &range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "USER_ENTERED");

        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [[value]],
        };
        self.client.send(self.client.http.put(url).json(&body)).await?;

        debug!("Wrote {} = {}", range, value);
        Ok(())
    }
}
