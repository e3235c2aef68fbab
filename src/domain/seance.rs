//! # Seance value objects
//!
//! Shows and seances as they come off the portal, plus the canonical
//! record shape shared by the deduplicator and the reconciler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the shows page: display name and absolute detail URL.
///
/// Short-lived: the listing extractor yields these and the session runner
/// visits each detail page right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowListing {
    pub name: String,
    pub detail_link: String,
}

/// Field set read from one row of a show's seance table, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSeanceRow {
    /// Display name of the show the row belongs to
    pub production: String,
    pub city: String,
    pub hall: String,
    pub date: String,
    pub time: String,
    pub sold: String,
    pub available: String,
    /// Producer cell, only read when the organization comes from the page
    pub producer: Option<String>,
}

/// Canonical seance record.
///
/// `sold` and `available` are carried as the portal prints them; the ledger
/// receives `sold` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeanceRecord {
    pub production: String,
    pub city: String,
    pub org: String,
    pub hall: String,
    /// `dd/mm/yyyy`, slash delimited
    pub date: String,
    pub time: String,
    pub sold: String,
    pub available: String,
}

impl SeanceRecord {
    /// Identity of this record for dedup and ledger matching
    #[must_use]
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.production, &self.date)
    }
}

/// `(production, date)` identity of a seance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    pub production: String,
    pub date: String,
}

impl CompositeKey {
    #[must_use]
    pub fn new(production: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            production: production.into(),
            date: date.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.production, self.date)
    }
}

/// Rewrites period-delimited dates (`01.01.2025`) as slash-delimited ones.
///
/// Idempotent: slash-delimited input comes back unchanged.
#[must_use]
pub fn canonicalize_date(raw: &str) -> String {
    raw.trim().replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(production: &str, date: &str, hall: &str) -> SeanceRecord {
        SeanceRecord {
            production: production.to_string(),
            city: "Istanbul".to_string(),
            org: "Bravo".to_string(),
            hall: hall.to_string(),
            date: date.to_string(),
            time: "20:30".to_string(),
            sold: "10".to_string(),
            available: "90".to_string(),
        }
    }

    #[test]
    fn test_key_ignores_non_identity_fields() {
        let a = record("Show A", "01/01/2025", "Main Hall");
        let b = record("Show A", "01/01/2025", "Small Hall");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), record("Show A", "02/01/2025", "Main Hall").key());
    }

    #[test]
    fn test_key_display() {
        let key = CompositeKey::new("Show A", "01/01/2025");
        assert_eq!(key.to_string(), "Show A @ 01/01/2025");
    }
}
