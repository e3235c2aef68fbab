//! Raw row to canonical record

use crate::domain::{canonicalize_date, RawSeanceRow, SeanceRecord};
use crate::infrastructure::config::{AppConfig, OrgSource};

/// Turns raw seance rows into [`SeanceRecord`]s.
///
/// With [`OrgSource::Fixed`] every record carries the configured label;
/// with [`OrgSource::Page`] the producer cell is used as-is.
#[derive(Debug, Clone)]
pub struct Normalizer {
    org_source: OrgSource,
    target_org_label: String,
}

impl Normalizer {
    #[must_use]
    pub fn new(org_source: OrgSource, target_org_label: impl Into<String>) -> Self {
        Self {
            org_source,
            target_org_label: target_org_label.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.schema.org_source, config.ledger.target_org_label.clone())
    }

    #[must_use]
    pub fn normalize(&self, raw: RawSeanceRow) -> SeanceRecord {
        let org = match self.org_source {
            OrgSource::Fixed => self.target_org_label.clone(),
            OrgSource::Page => raw.producer.as_deref().map(str::trim).unwrap_or_default().to_string(),
        };

        SeanceRecord {
            production: raw.production.trim().to_string(),
            city: raw.city.trim().to_string(),
            org,
            hall: raw.hall.trim().to_string(),
            date: canonicalize_date(&raw.date),
            time: raw.time.trim().to_string(),
            sold: raw.sold.trim().to_string(),
            available: raw.available.trim().to_string(),
        }
    }
}
