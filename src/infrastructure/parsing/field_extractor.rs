//! Seance row field extraction
//!
//! Every cell read ends in a [`FieldRead`]; a row ends in a [`RowOutcome`].
//! Missing cells are the common case on this portal (cancelled seances,
//! placeholder rows), so they are values, not errors.

use serde::Serialize;
use std::fmt;

use crate::domain::RawSeanceRow;
use crate::infrastructure::browser::PageElement;
use crate::infrastructure::config::{OrgSource, SeanceFieldSelectors};

/// Result of reading one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRead {
    /// Non-empty, trimmed text
    Present(String),
    /// No matching cell, or the cell is blank
    Absent,
    /// The lookup itself failed (stale handle, protocol error, ...)
    Malformed(String),
}

/// Result of reading one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Complete(RawSeanceRow),
    MissingField { field: &'static str },
    StructuralFault { field: &'static str, reason: String },
}

/// Per-scan fault counters, reported after each scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub complete: usize,
    pub missing_field: usize,
    pub unexpected: usize,
}

impl ExtractionStats {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Complete(_) => self.complete += 1,
            RowOutcome::MissingField { .. } => self.missing_field += 1,
            RowOutcome::StructuralFault { .. } => self.unexpected += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.complete += other.complete;
        self.missing_field += other.missing_field;
        self.unexpected += other.unexpected;
    }

    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.missing_field + self.unexpected
    }
}

impl fmt::Display for ExtractionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} complete, {} skipped (missing field: {}, unexpected: {})",
            self.complete,
            self.skipped(),
            self.missing_field,
            self.unexpected
        )
    }
}

/// Reads the fixed set of seance cells from one row handle
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    selectors: SeanceFieldSelectors,
    read_producer: bool,
}

impl FieldExtractor {
    #[must_use]
    pub fn new(selectors: SeanceFieldSelectors, org_source: OrgSource) -> Self {
        Self {
            selectors,
            read_producer: org_source == OrgSource::Page,
        }
    }

    /// Read one cell by selector
    pub async fn read_field<E: PageElement>(row: &E, selector: &str) -> FieldRead {
        let cell = match row.find(selector).await {
            Ok(Some(cell)) => cell,
            Ok(None) => return FieldRead::Absent,
            Err(e) => return FieldRead::Malformed(e.to_string()),
        };

        match cell.text().await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    FieldRead::Absent
                } else {
                    FieldRead::Present(text.to_string())
                }
            }
            Err(e) => FieldRead::Malformed(e.to_string()),
        }
    }

    /// Read every required cell of `row`; `production` is the owning show's name
    pub async fn extract<E: PageElement>(&self, row: &E, production: &str) -> RowOutcome {
        let mut fields = [
            ("city", &self.selectors.city, String::new()),
            ("hall", &self.selectors.hall, String::new()),
            ("date", &self.selectors.date, String::new()),
            ("time", &self.selectors.time, String::new()),
            ("sold", &self.selectors.sold, String::new()),
            ("available", &self.selectors.available, String::new()),
        ];

        for (field, selector, value) in &mut fields {
            match Self::read_field(row, selector.as_str()).await {
                FieldRead::Present(text) => *value = text,
                FieldRead::Absent => return RowOutcome::MissingField { field: *field },
                FieldRead::Malformed(reason) => {
                    return RowOutcome::StructuralFault { field: *field, reason };
                }
            }
        }

        let producer = if self.read_producer {
            match Self::read_field(row, &self.selectors.producer).await {
                FieldRead::Present(text) => Some(text),
                FieldRead::Absent => return RowOutcome::MissingField { field: "producer" },
                FieldRead::Malformed(reason) => {
                    return RowOutcome::StructuralFault {
                        field: "producer",
                        reason,
                    };
                }
            }
        } else {
            None
        };

        let [city, hall, date, time, sold, available] = fields.map(|(_, _, value)| value);

        RowOutcome::Complete(RawSeanceRow {
            production: production.to_string(),
            city,
            hall,
            date,
            time,
            sold,
            available,
            producer,
        })
    }
}
