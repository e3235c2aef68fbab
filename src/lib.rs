//! Seance Sync - ticketing portal harvester and sales ledger reconciler
//!
//! Logs into the ticketing portal once per configured credential, collects
//! every show's seances, merges them across sessions and writes sold counts
//! back into the matching rows of the sales ledger.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
