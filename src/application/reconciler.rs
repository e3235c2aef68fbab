//! Ledger reconciliation
//!
//! One pass matches every eligible record against a snapshot read once up
//! front. A match overwrites the row's sold cell and its last-updated cell;
//! nothing else is ever written and no row is ever added.

#![allow(clippy::uninlined_format_args)]

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{LedgerColumns, LedgerRow, LedgerSchemaError, LedgerSnapshot, ReconciliationReport, SeanceRecord};
use crate::infrastructure::config::{ConfigError, LedgerConfig};
use crate::infrastructure::ledger_client::{LedgerError, LedgerTab};

#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    #[error("Required ledger column '{column}' not found in header row")]
    MissingColumn { column: String },

    #[error("Invalid timestamp format '{format}'")]
    TimestampFormat { format: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<LedgerSchemaError> for ReconcileError {
    fn from(err: LedgerSchemaError) -> Self {
        match err {
            LedgerSchemaError::MissingColumn { column } => Self::MissingColumn { column },
        }
    }
}

/// Source of the site-local "now" written into last-updated cells
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock shifted to the site's UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SiteClock {
    offset: FixedOffset,
}

impl SiteClock {
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SiteClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Whether `row` is the ledger entry for `record`.
///
/// Titles match by containment in either direction, dates exactly, and the
/// record's organization must contain the row's.
#[must_use]
pub fn row_matches(record: &SeanceRecord, row: &LedgerRow) -> bool {
    let titles_overlap =
        record.production.contains(row.production.as_str()) || row.production.contains(record.production.as_str());

    titles_overlap && row.date == record.date && record.org.contains(row.org.as_str())
}

#[derive(Debug, Clone)]
pub struct Reconciler<C: Clock> {
    target_org_label: String,
    timestamp_format: String,
    clock: C,
}

impl Reconciler<SiteClock> {
    pub fn from_config(config: &LedgerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.target_org_label.clone(),
            config.timestamp_format.clone(),
            SiteClock::new(config.site_offset()?),
        ))
    }
}

impl<C: Clock> Reconciler<C> {
    pub fn new(target_org_label: impl Into<String>, timestamp_format: impl Into<String>, clock: C) -> Self {
        Self {
            target_org_label: target_org_label.into(),
            timestamp_format: timestamp_format.into(),
            clock,
        }
    }

    /// Read the whole tab once and resolve the required columns
    pub async fn snapshot<T: LedgerTab>(tab: &T, columns: &LedgerColumns) -> Result<LedgerSnapshot, ReconcileError> {
        let table = tab.read_all_rows().await?;
        let snapshot = LedgerSnapshot::from_table(&table, columns)?;
        info!("Ledger snapshot: {} rows", snapshot.len());
        Ok(snapshot)
    }

    /// First matching row in snapshot order
    #[must_use]
    pub fn find_match<'a>(&self, snapshot: &'a LedgerSnapshot, record: &SeanceRecord) -> Option<&'a LedgerRow> {
        snapshot.rows().iter().find(|row| row_matches(record, row))
    }

    /// Site-local now in the configured format
    fn timestamp(&self) -> Result<String, ReconcileError> {
        let mut timestamp = String::new();
        write!(timestamp, "{}", self.clock.now().format(&self.timestamp_format)).map_err(|_| {
            ReconcileError::TimestampFormat {
                format: self.timestamp_format.clone(),
            }
        })?;
        Ok(timestamp)
    }

    pub async fn reconcile<T: LedgerTab>(
        &self,
        snapshot: &LedgerSnapshot,
        records: &[SeanceRecord],
        tab: &T,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let mut report = ReconciliationReport::default();

        for record in records {
            if record.org != self.target_org_label {
                debug!("Skipping {} (organization '{}')", record.key(), record.org);
                report.skipped_other_org += 1;
                continue;
            }

            let Some(row) = self.find_match(snapshot, record) else {
                debug!("No ledger row for {}", record.key());
                report.unmatched.push(record.key());
                continue;
            };

            let timestamp = self.timestamp()?;
            tab.write_cell(row.sheet_row(), snapshot.sold_column(), &record.sold).await?;
            tab.write_cell(row.sheet_row(), snapshot.last_updated_column(), &timestamp)
                .await?;

            info!(
                "Updated sheet row {} for {}: sold={} at {}",
                row.sheet_row(),
                record.key(),
                record.sold,
                timestamp
            );
            report.updated_count += 1;
        }

        info!(
            "Reconciliation: {} updated, {} unmatched, {} other organization",
            report.updated_count,
            report.unmatched.len(),
            report.skipped_other_org
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompositeKey, LedgerTable};
    use crate::infrastructure::ledger_client::LedgerClient;
    use crate::test_utils::MemoryLedger;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const HEADERS: [&str; 6] = ["Production", "City", "Date", "Organization", "Sold", "Last Updated"];
    const SOLD_COL: usize = 5;
    const UPDATED_COL: usize = 6;

    fn clock() -> FixedClock {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        FixedClock(offset.with_ymd_and_hms(2025, 1, 2, 14, 5, 9).unwrap())
    }

    fn reconciler(target: &str) -> Reconciler<FixedClock> {
        Reconciler::new(target, "%d/%m/%Y %H:%M:%S", clock())
    }

    fn record(production: &str, date: &str, org: &str, sold: &str) -> SeanceRecord {
        SeanceRecord {
            production: production.to_string(),
            city: "Istanbul".to_string(),
            org: org.to_string(),
            hall: "Main Hall".to_string(),
            date: date.to_string(),
            time: "20:30".to_string(),
            sold: sold.to_string(),
            available: "0".to_string(),
        }
    }

    async fn open(ledger: &MemoryLedger) -> (crate::test_utils::MemoryTab, LedgerSnapshot) {
        let tab = ledger.open_tab("sheet", "Seances").await.unwrap();
        let snapshot = Reconciler::<FixedClock>::snapshot(&tab, &LedgerColumns::default())
            .await
            .unwrap();
        (tab, snapshot)
    }

    #[tokio::test]
    async fn test_symmetric_title_containment_and_org_substring() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["Show", "Istanbul", "01/01/2025", "Bravo", "0", ""]]);
        let (tab, snapshot) = open(&ledger).await;

        let report = reconciler("Bravo Productions")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo Productions", "57")], &tab)
            .await
            .unwrap();

        assert_eq!(report.updated_count, 1);
        assert!(report.unmatched.is_empty());
        assert_eq!(
            ledger.writes(),
            vec![
                (2, SOLD_COL, "57".to_string()),
                (2, UPDATED_COL, "02/01/2025 14:05:09".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_record_title_inside_ledger_title_matches() {
        let ledger = MemoryLedger::with_tab(
            "Seances",
            &HEADERS,
            &[&["Other", "X", "01/01/2025", "Bravo", "", ""], &["Show A - Gala", "X", "01.01.2025", "Bravo", "", ""]],
        );
        let (tab, snapshot) = open(&ledger).await;

        let report = reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "9")], &tab)
            .await
            .unwrap();

        assert_eq!(report.updated_count, 1);
        assert_eq!(ledger.writes()[0], (3, SOLD_COL, "9".to_string()));
    }

    #[tokio::test]
    async fn test_only_first_matching_row_is_updated() {
        let ledger = MemoryLedger::with_tab(
            "Seances",
            &HEADERS,
            &[
                &["Show A", "X", "01/01/2025", "Bravo", "", ""],
                &["Show A", "Y", "01/01/2025", "Bravo", "", ""],
            ],
        );
        let (tab, snapshot) = open(&ledger).await;

        reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "3")], &tab)
            .await
            .unwrap();

        let rows: Vec<_> = ledger.writes().iter().map(|(row, _, _)| *row).collect();
        assert_eq!(rows, vec![2, 2]);
    }

    #[tokio::test]
    async fn test_date_mismatch_is_unmatched() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["Show A", "X", "02/01/2025", "Bravo", "", ""]]);
        let (tab, snapshot) = open(&ledger).await;

        let report = reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "3")], &tab)
            .await
            .unwrap();

        assert_eq!(report.updated_count, 0);
        assert_eq!(report.unmatched, vec![CompositeKey::new("Show A", "01/01/2025")]);
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn test_other_org_is_neither_updated_nor_unmatched() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["Show A", "X", "01/01/2025", "OtherPromoter", "", ""]]);
        let (tab, snapshot) = open(&ledger).await;

        let report = reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "OtherPromoter", "3")], &tab)
            .await
            .unwrap();

        assert_eq!(report.updated_count, 0);
        assert!(report.unmatched.is_empty());
        assert_eq!(report.skipped_other_org, 1);
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn test_blank_ledger_production_is_contained_in_any_title() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["", "X", "01/01/2025", "Bravo", "", ""]]);
        let (tab, snapshot) = open(&ledger).await;

        let report = reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "3")], &tab)
            .await
            .unwrap();

        assert_eq!(report.updated_count, 1);
        assert!(report.unmatched.is_empty());
        assert_eq!(ledger.writes()[0], (2, SOLD_COL, "3".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_timestamp_format_is_an_error_not_a_panic() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["Show A", "X", "01/01/2025", "Bravo", "", ""]]);
        let (tab, snapshot) = open(&ledger).await;

        let result = Reconciler::new("Bravo", "%Q", clock())
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "3")], &tab)
            .await;

        assert!(matches!(result, Err(ReconcileError::TimestampFormat { format }) if format == "%Q"));
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_column_fails_before_any_write() {
        let ledger = MemoryLedger::with_tab("Seances", &["Production", "Date", "Organization", "Sold"], &[]);
        let tab = ledger.open_tab("sheet", "Seances").await.unwrap();

        let result = Reconciler::<FixedClock>::snapshot(&tab, &LedgerColumns::default()).await;
        assert!(matches!(result, Err(ReconcileError::MissingColumn { column }) if column == "Last Updated"));
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &[&["Show A", "X", "01/01/2025", "Bravo", "", ""]]);
        let (tab, snapshot) = open(&ledger).await;
        ledger.fail_writes();

        let result = reconciler("Bravo")
            .reconcile(&snapshot, &[record("Show A", "01/01/2025", "Bravo", "3")], &tab)
            .await;
        assert!(matches!(result, Err(ReconcileError::Ledger(LedgerError::Api { status: 503, .. }))));
    }

    fn arb_case() -> impl Strategy<Value = (Vec<SeanceRecord>, Vec<(String, String, String)>)> {
        let names = prop::sample::select(vec!["Show A", "Show B", "Gala", "Show A Gala"]);
        let dates = prop::sample::select(vec!["01/01/2025", "02/01/2025"]);
        let orgs = prop::sample::select(vec!["Bravo", "OtherPromoter"]);
        (
            prop::collection::vec((names.clone(), dates.clone(), orgs.clone()), 0..12),
            prop::collection::vec((names, dates, orgs), 0..8),
        )
            .prop_map(|(records, rows)| {
                (
                    records
                        .into_iter()
                        .map(|(n, d, o)| record(n, d, o, "1"))
                        .collect(),
                    rows.into_iter()
                        .map(|(n, d, o)| (n.to_string(), d.to_string(), o.to_string()))
                        .collect(),
                )
            })
    }

    proptest! {
        #[test]
        fn prop_counts_add_up_and_rows_are_never_created((records, rows) in arb_case()) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let table = LedgerTable {
                    headers: HEADERS.iter().map(|h| (*h).to_string()).collect(),
                    rows: rows
                        .iter()
                        .map(|(n, d, o)| {
                            [("Production", n.as_str()), ("Date", d.as_str()), ("Organization", o.as_str())]
                                .into_iter()
                                .map(|(h, v)| (h.to_string(), v.to_string()))
                                .collect()
                        })
                        .collect(),
                };
                let cells: Vec<Vec<&str>> = rows
                    .iter()
                    .map(|(n, d, o)| vec![n.as_str(), "X", d.as_str(), o.as_str(), "", ""])
                    .collect();
                let cell_refs: Vec<&[&str]> = cells.iter().map(Vec::as_slice).collect();
                let ledger = MemoryLedger::with_tab("Seances", &HEADERS, &cell_refs);
                let tab = ledger.open_tab("sheet", "Seances").await.unwrap();
                let snapshot = LedgerSnapshot::from_table(&table, &LedgerColumns::default()).unwrap();

                let report = reconciler("Bravo").reconcile(&snapshot, &records, &tab).await.unwrap();

                let eligible = records.iter().filter(|r| r.org == "Bravo").count();
                prop_assert_eq!(report.updated_count + report.unmatched.len(), eligible);
                prop_assert_eq!(ledger.row_count("Seances"), rows.len());
                prop_assert_eq!(ledger.writes().len(), report.updated_count * 2);
                Ok(())
            })?;
        }
    }
}
