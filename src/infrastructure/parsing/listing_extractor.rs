//! Shows table and seance table scans
//!
//! The shows table uses ARIA rows; the first row is a header and carries
//! `columnheader` cells instead of `cell`s. Seance tables may be wrapped in
//! a content frame; when no frame shows up within the frame timeout the
//! scan continues on the top-level document.

#![allow(clippy::uninlined_format_args)]

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use super::error::{ParsingError, ParsingResult};
use super::field_extractor::{ExtractionStats, FieldExtractor, RowOutcome};
use crate::domain::{RawSeanceRow, ShowListing};
use crate::infrastructure::browser::{wait_until, BrowserError, BrowserResult, BrowserSession, PageElement};
use crate::infrastructure::config::{ListingSelectors, OrgSource, PortalConfig, TimingConfig};

/// Rows read from one show's detail page
#[derive(Debug, Clone, Default)]
pub struct ShowSeances {
    pub rows: Vec<RawSeanceRow>,
    pub stats: ExtractionStats,
    /// Whether the table was read inside the content frame
    pub used_frame: bool,
}

#[derive(Debug, Clone)]
pub struct ListingExtractor {
    base_url: String,
    content_frame_id: String,
    selectors: ListingSelectors,
    fields: FieldExtractor,
    table_timeout: Duration,
    frame_timeout: Duration,
    poll_interval: Duration,
}

impl ListingExtractor {
    #[must_use]
    pub fn new(portal: &PortalConfig, timing: &TimingConfig, org_source: OrgSource) -> Self {
        Self {
            base_url: portal.base_url.clone(),
            content_frame_id: portal.content_frame_id.clone(),
            selectors: portal.listing.clone(),
            fields: FieldExtractor::new(portal.fields.clone(), org_source),
            table_timeout: timing.table_timeout(),
            frame_timeout: timing.frame_timeout(),
            poll_interval: timing.poll_interval(),
        }
    }

    /// Make a detail link absolute against the portal host
    pub fn resolve_link(&self, href: &str) -> ParsingResult<String> {
        let href = href.trim();
        if let Ok(absolute) = Url::parse(href) {
            return Ok(absolute.to_string());
        }

        let base = Url::parse(&self.base_url).map_err(|e| ParsingError::UrlResolutionFailed {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        base.join(href)
            .map(|url| url.to_string())
            .map_err(|e| ParsingError::UrlResolutionFailed {
                url: href.to_string(),
                reason: e.to_string(),
            })
    }

    /// Read all shows from the shows page the browser is currently on.
    ///
    /// Waits for the table, skips the header row and any row that does not
    /// yield both a name and a detail link.
    pub async fn list_shows<B: BrowserSession>(&self, browser: &B) -> BrowserResult<Vec<ShowListing>> {
        wait_until("shows table", self.table_timeout, self.poll_interval, || async move {
            browser.query_all(&self.selectors.show_row).await.map(|rows| !rows.is_empty())
        })
        .await?;

        let rows = browser.query_all(&self.selectors.show_row).await?;
        let mut shows = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            match self.read_show_row(row).await {
                Ok(Some(show)) => {
                    debug!("Show row {}: {} -> {}", index, show.name, show.detail_link);
                    shows.push(show);
                }
                Ok(None) => debug!("Show row {} is a header row", index),
                Err(e) => warn!("Skipping show row {}: {}", index, e),
            }
        }

        info!("Found {} shows ({} table rows)", shows.len(), rows.len());
        Ok(shows)
    }

    async fn read_show_row<E: PageElement>(&self, row: &E) -> ParsingResult<Option<ShowListing>> {
        if row.find(&self.selectors.header_cell).await?.is_some() {
            return Ok(None);
        }

        let name = match row.find(&self.selectors.show_name).await? {
            Some(cell) => cell.text().await?.trim().to_string(),
            None => String::new(),
        };
        if name.is_empty() {
            return Err(ParsingError::required_field_missing("show name", "show row"));
        }

        let href = match row.find(&self.selectors.details_link).await? {
            Some(link) => link.attribute("href").await?,
            None => None,
        };
        let href = href
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ParsingError::required_field_missing("details link", &name))?;

        Ok(Some(ShowListing {
            detail_link: self.resolve_link(&href)?,
            name,
        }))
    }

    /// Visit one show's detail page and read its seance rows.
    ///
    /// A missing frame or an empty table are not errors; only navigation
    /// failure is.
    pub async fn seance_rows<B: BrowserSession>(&self, browser: &B, show: &ShowListing) -> BrowserResult<ShowSeances> {
        browser.navigate(&show.detail_link).await?;

        let used_frame = self.enter_content_frame(browser).await;

        let table_ready = wait_until("seance rows", self.table_timeout, self.poll_interval, || async move {
            browser.query_all(&self.selectors.seance_row).await.map(|rows| !rows.is_empty())
        })
        .await;

        let mut seances = ShowSeances {
            used_frame,
            ..ShowSeances::default()
        };

        match table_ready {
            Ok(()) => self.scan_seance_rows(browser, show, &mut seances).await,
            Err(BrowserError::Timeout { .. }) => {
                info!("No seance rows for '{}' within {:?}", show.name, self.table_timeout);
            }
            Err(e) => warn!("Seance table wait failed for '{}': {}", show.name, e),
        }

        if used_frame {
            if let Err(e) = browser.switch_to_default_content().await {
                warn!("Failed to leave content frame for '{}': {}", show.name, e);
            }
        }

        info!("Show '{}': {}", show.name, seances.stats);
        Ok(seances)
    }

    async fn enter_content_frame<B: BrowserSession>(&self, browser: &B) -> bool {
        let entered = wait_until("content frame", self.frame_timeout, self.poll_interval, || async move {
            browser.switch_to_frame(&self.content_frame_id).await.map(|()| true)
        })
        .await;

        match entered {
            Ok(()) => {
                debug!("Switched into frame '{}'", self.content_frame_id);
                true
            }
            Err(e) => {
                debug!("Continuing without frame '{}': {}", self.content_frame_id, e);
                false
            }
        }
    }

    async fn scan_seance_rows<B: BrowserSession>(&self, browser: &B, show: &ShowListing, seances: &mut ShowSeances) {
        let rows = match browser.query_all(&self.selectors.seance_row).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to list seance rows for '{}': {}", show.name, e);
                return;
            }
        };

        for (index, row) in rows.iter().enumerate() {
            let outcome = self.fields.extract(row, &show.name).await;
            seances.stats.record(&outcome);

            match outcome {
                RowOutcome::Complete(raw) => seances.rows.push(raw),
                RowOutcome::MissingField { field } => {
                    debug!("'{}' row {}: missing {}", show.name, index, field);
                }
                RowOutcome::StructuralFault { field, reason } => {
                    warn!("'{}' row {}: unreadable {}: {}", show.name, index, field, reason);
                }
            }
        }
    }
}
