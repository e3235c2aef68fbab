//! Cross-session deduplication by composite key

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::{CompositeKey, SeanceRecord};

/// Result of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// First record seen for each key, in first-seen order
    pub unique: Vec<SeanceRecord>,
    /// Distinct keys that were seen more than once, in order of first repeat
    pub duplicates: Vec<CompositeKey>,
}

/// Owns the seen-key set; first record wins
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<CompositeKey>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge records in order. Keys seen by an earlier `merge` on the same
    /// deduplicator also count as seen.
    pub fn merge<I>(&mut self, records: I) -> MergeOutcome
    where
        I: IntoIterator<Item = SeanceRecord>,
    {
        let mut outcome = MergeOutcome::default();
        let mut reported = HashSet::new();

        for record in records {
            let key = record.key();
            if self.seen.insert(key.clone()) {
                outcome.unique.push(record);
            } else if reported.insert(key.clone()) {
                outcome.duplicates.push(key);
            }
        }

        outcome
    }

    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Report-only check: distinct keys occurring more than once, nothing pruned
    #[must_use]
    pub fn duplicate_keys(records: &[SeanceRecord]) -> Vec<CompositeKey> {
        Self::new().merge(records.iter().cloned()).duplicates
    }
}
