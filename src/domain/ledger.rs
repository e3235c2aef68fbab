//! # Ledger model
//!
//! The ledger is a row-oriented remote table. One pass of reconciliation
//! works against a [`LedgerSnapshot`] read once up front; cells are addressed
//! 1-based with the header on row 1, so snapshot row `i` lives on sheet row
//! `i + DATA_ROW_OFFSET`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::seance::{canonicalize_date, CompositeKey};

/// Sheet row of the first data row (row 1 holds the headers)
pub const DATA_ROW_OFFSET: usize = 2;

/// Raw tab contents as returned by a ledger client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTable {
    /// Header names in column order
    pub headers: Vec<String>,
    /// One map of header name to cell text per data row
    pub rows: Vec<HashMap<String, String>>,
}

/// Header names of the columns reconciliation reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerColumns {
    pub production: String,
    pub date: String,
    pub org: String,
    pub sold: String,
    pub last_updated: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        Self {
            production: "Production".to_string(),
            date: "Date".to_string(),
            org: "Organization".to_string(),
            sold: "Sold".to_string(),
            last_updated: "Last Updated".to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerSchemaError {
    #[error("Required ledger column '{column}' not found in header row")]
    MissingColumn { column: String },
}

/// One data row of the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    /// 0-based position in the snapshot
    pub index: usize,
    pub production: String,
    /// Canonical slash-delimited date
    pub date: String,
    pub org: String,
}

impl LedgerRow {
    /// 1-based sheet row holding this data row
    #[must_use]
    pub const fn sheet_row(&self) -> usize {
        self.index + DATA_ROW_OFFSET
    }
}

/// Immutable view of the ledger for one reconciliation pass
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    rows: Vec<LedgerRow>,
    sold_column: usize,
    last_updated_column: usize,
}

impl LedgerSnapshot {
    /// Build a snapshot, resolving every required column up front so a bad
    /// header row fails before anything is written.
    pub fn from_table(table: &LedgerTable, columns: &LedgerColumns) -> Result<Self, LedgerSchemaError> {
        let header_index: HashMap<String, usize> = table
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i + 1))
            .collect();

        let lookup = |column: &str| {
            header_index
                .get(column)
                .copied()
                .ok_or_else(|| LedgerSchemaError::MissingColumn {
                    column: column.to_string(),
                })
        };
        lookup(&columns.production)?;
        lookup(&columns.date)?;
        lookup(&columns.org)?;
        let sold_column = lookup(&columns.sold)?;
        let last_updated_column = lookup(&columns.last_updated)?;

        let cell = |row: &HashMap<String, String>, column: &str| {
            row.get(column).map(|v| v.trim().to_string()).unwrap_or_default()
        };

        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| LedgerRow {
                index,
                production: cell(row, &columns.production),
                date: canonicalize_date(&cell(row, &columns.date)),
                org: cell(row, &columns.org),
            })
            .collect();

        Ok(Self {
            rows,
            sold_column,
            last_updated_column,
        })
    }

    #[must_use]
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub const fn sold_column(&self) -> usize {
        self.sold_column
    }

    #[must_use]
    pub const fn last_updated_column(&self) -> usize {
        self.last_updated_column
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub updated_count: usize,
    /// Keys of eligible records with no matching ledger row, in input order
    pub unmatched: Vec<CompositeKey>,
    /// Records skipped because their organization is not the target one
    pub skipped_other_org: usize,
}
