//! Full run: every credential, one merge, one reconciliation pass

#![allow(clippy::uninlined_format_args)]

use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

use super::deduplicator::Deduplicator;
use super::reconciler::{Clock, ReconcileError, Reconciler};
use super::session_runner::{SessionOutput, SessionRunner};
use crate::domain::{CompositeKey, ReconciliationReport};
use crate::infrastructure::browser::BrowserLauncher;
use crate::infrastructure::config::{CredentialSet, LedgerConfig};
use crate::infrastructure::ledger_client::LedgerClient;
use crate::infrastructure::parsing::ExtractionStats;

/// Per-session line of the run summary
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub identity: String,
    pub shows: usize,
    pub records: usize,
    pub duplicates: usize,
    pub failed_shows: usize,
    pub stats: ExtractionStats,
}

impl From<&SessionOutput> for SessionSummary {
    fn from(output: &SessionOutput) -> Self {
        Self {
            identity: output.identity.clone(),
            shows: output.shows,
            records: output.records.len(),
            duplicates: output.duplicates.len(),
            failed_shows: output.failed_shows.len(),
            stats: output.stats,
        }
    }
}

/// A credential whose session did not complete
#[derive(Debug, Clone, Serialize)]
pub struct FailedSession {
    pub identity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sessions: Vec<SessionSummary>,
    pub failed: Vec<FailedSession>,
    /// Keys dropped by the cross-session merge
    pub merged_duplicates: Vec<CompositeKey>,
    pub unique_records: usize,
    pub report: ReconciliationReport,
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Shows")]
    shows: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Dup keys")]
    duplicates: String,
    #[tabled(rename = "Skipped rows")]
    skipped: String,
}

#[derive(Tabled)]
struct TotalRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl RunSummary {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Console summary: one table of sessions, one of totals, then unmatched keys
    #[must_use]
    pub fn render_table(&self) -> String {
        let session_rows = self
            .sessions
            .iter()
            .map(|s| SessionRow {
                identity: s.identity.clone(),
                status: "ok".to_string(),
                shows: s.shows.to_string(),
                records: s.records.to_string(),
                duplicates: s.duplicates.to_string(),
                skipped: s.stats.skipped().to_string(),
            })
            .chain(self.failed.iter().map(|f| SessionRow {
                identity: f.identity.clone(),
                status: format!("FAILED: {}", f.reason),
                shows: "-".to_string(),
                records: "-".to_string(),
                duplicates: "-".to_string(),
                skipped: "-".to_string(),
            }));

        let totals = vec![
            TotalRow {
                metric: "Unique seances",
                value: self.unique_records.to_string(),
            },
            TotalRow {
                metric: "Cross-session duplicates",
                value: self.merged_duplicates.len().to_string(),
            },
            TotalRow {
                metric: "Ledger rows updated",
                value: self.report.updated_count.to_string(),
            },
            TotalRow {
                metric: "Unmatched",
                value: self.report.unmatched.len().to_string(),
            },
            TotalRow {
                metric: "Other organization",
                value: self.report.skipped_other_org.to_string(),
            },
        ];

        let mut out = format!("{}\n{}\n", Table::new(session_rows), Table::new(totals));
        if !self.report.unmatched.is_empty() {
            out.push_str("Unmatched seances:\n");
            for key in &self.report.unmatched {
                out.push_str(&format!("  {}\n", key));
            }
        }
        out
    }
}

pub struct SeanceSyncService<L: BrowserLauncher, C: LedgerClient, K: Clock> {
    runner: SessionRunner<L>,
    ledger: C,
    ledger_config: LedgerConfig,
    reconciler: Reconciler<K>,
}

impl<L: BrowserLauncher, C: LedgerClient, K: Clock> SeanceSyncService<L, C, K> {
    pub fn new(runner: SessionRunner<L>, ledger: C, ledger_config: LedgerConfig, reconciler: Reconciler<K>) -> Self {
        Self {
            runner,
            ledger,
            ledger_config,
            reconciler,
        }
    }

    /// Run every credential in order, then merge and reconcile what was collected.
    ///
    /// A failed session is recorded in the summary and the next credential
    /// still runs; ledger failures abort the run.
    pub async fn run(&self, credentials: &CredentialSet) -> Result<RunSummary, ReconcileError> {
        let mut summary = RunSummary::default();
        let mut collected = Vec::new();

        for credential in credentials {
            match self.runner.run(credential).await {
                Ok(output) => {
                    summary.sessions.push(SessionSummary::from(&output));
                    collected.extend(output.records);
                }
                Err(e) => {
                    error!("Session for {} failed: {}", credential.identity, e);
                    summary.failed.push(FailedSession {
                        identity: credential.identity.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut dedup = Deduplicator::new();
        let merged = dedup.merge(collected);
        for key in &merged.duplicates {
            info!("Dropped cross-session duplicate {}", key);
        }
        info!(
            "Merged sessions into {} unique seances ({} distinct keys)",
            merged.unique.len(),
            dedup.seen_count()
        );
        summary.unique_records = merged.unique.len();
        summary.merged_duplicates = merged.duplicates;

        if merged.unique.is_empty() {
            warn!("No seance records collected; ledger left untouched");
            return Ok(summary);
        }

        let tab = self
            .ledger
            .open_tab(&self.ledger_config.spreadsheet, &self.ledger_config.tab)
            .await?;
        let snapshot = Reconciler::<K>::snapshot(&tab, &self.ledger_config.columns).await?;
        summary.report = self.reconciler.reconcile(&snapshot, &merged.unique, &tab).await?;

        Ok(summary)
    }
}
