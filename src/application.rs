//! Application layer module
//!
//! Orchestrates one run: a session per credential, normalization of what
//! each session extracts, the cross-session merge, and the ledger pass.

pub mod deduplicator;
pub mod normalizer;
pub mod reconciler;
pub mod session_runner;
pub mod sync_service;

pub use deduplicator::{Deduplicator, MergeOutcome};
pub use normalizer::Normalizer;
pub use reconciler::{row_matches, Clock, FixedClock, ReconcileError, Reconciler, SiteClock};
pub use session_runner::{SessionError, SessionOutput, SessionRunner};
pub use sync_service::{FailedSession, RunSummary, SeanceSyncService, SessionSummary};
