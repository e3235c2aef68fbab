//! Ledger capability
//!
//! A ledger is a spreadsheet-like remote store. Reconciliation needs exactly
//! three things from it: open a tab, read the whole tab once, and write single
//! cells addressed 1-based (header = row 1). Rows are never appended.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::LedgerTable;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Tab '{tab}' not found in spreadsheet '{spreadsheet}'")]
    TabNotFound { spreadsheet: String, tab: String },

    #[error("Ledger API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport failed: {message}")]
    Transport { message: String },

    #[error("Malformed ledger payload: {message}")]
    Malformed { message: String },

    #[error("Invalid cell address: row {row}, column {column}")]
    InvalidAddress { row: usize, column: usize },

    #[error("Missing access token: environment variable {variable} is not set")]
    MissingToken { variable: String },
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// One opened tab of the ledger
#[async_trait(?Send)]
pub trait LedgerTab {
    async fn read_all_rows(&self) -> LedgerResult<LedgerTable>;

    /// Overwrite one existing cell. `row` and `column` are 1-based.
    async fn write_cell(&self, row: usize, column: usize, value: &str) -> LedgerResult<()>;
}

#[async_trait(?Send)]
pub trait LedgerClient {
    type Tab: LedgerTab;

    async fn open_tab(&self, spreadsheet: &str, tab: &str) -> LedgerResult<Self::Tab>;
}

/// Convert a 1-based column index to its A1 letters (1 -> A, 27 -> AA)
#[must_use]
pub fn column_letters(column: usize) -> String {
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        // rem < 26 so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation)]
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 reference for a 1-based cell address
pub fn a1_reference(row: usize, column: usize) -> LedgerResult<String> {
    if row == 0 || column == 0 {
        return Err(LedgerError::InvalidAddress { row, column });
    }
    Ok(format!("{}{}", column_letters(column), row))
}
