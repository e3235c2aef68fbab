//! One authenticated crawl per credential
//!
//! `login -> redirect -> shows page -> each show's seance page`, walking the
//! [`SessionState`] machine. The browser is launched per run and quit on
//! every exit path.

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::deduplicator::Deduplicator;
use super::normalizer::Normalizer;
use crate::domain::{CompositeKey, SeanceRecord, SessionState};
use crate::infrastructure::browser::{wait_until, BrowserError, BrowserLauncher, BrowserSession, PageElement};
use crate::infrastructure::config::{AppConfig, ConfigError, Credential, LoginSelectors};
use crate::infrastructure::parsing::{ExtractionStats, ListingExtractor};

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Login failed for {identity}: post-login page not reached within {timeout_secs}s")]
    LoginFailed {
        identity: String,
        timeout_secs: u64,
        /// Diagnostic screenshot, when one could be taken
        screenshot: Option<PathBuf>,
    },

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
}

/// Everything one successful session produced
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutput {
    pub identity: String,
    /// Normalized records in crawl order, not pruned
    pub records: Vec<SeanceRecord>,
    /// Keys seen more than once within this session
    pub duplicates: Vec<CompositeKey>,
    pub stats: ExtractionStats,
    pub shows: usize,
    /// Shows whose detail page could not be opened
    pub failed_shows: Vec<String>,
    pub states: Vec<SessionState>,
}

/// State history of one run
#[derive(Debug)]
struct StateTrail {
    identity: String,
    states: Vec<SessionState>,
}

impl StateTrail {
    fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            states: vec![SessionState::NotLoggedIn],
        }
    }

    fn current(&self) -> &SessionState {
        // never empty: seeded with NotLoggedIn
        &self.states[self.states.len() - 1]
    }

    fn advance(&mut self, next: SessionState) {
        if !self.current().can_transition_to(&next) {
            warn!("[{}] unexpected transition {} -> {}", self.identity, self.current(), next);
        }
        if next.is_terminal() {
            info!("[{}] Session finished: {}", self.identity, next);
        } else {
            debug!("[{}] {} -> {}", self.identity, self.current(), next);
        }
        self.states.push(next);
    }
}

pub struct SessionRunner<L: BrowserLauncher> {
    launcher: L,
    login_url: String,
    shows_url: String,
    login: LoginSelectors,
    redirect: Regex,
    login_form_timeout: Duration,
    redirect_timeout: Duration,
    poll_interval: Duration,
    screenshot_dir: PathBuf,
    extractor: ListingExtractor,
    normalizer: Normalizer,
}

impl<L: BrowserLauncher> SessionRunner<L> {
    pub fn new(launcher: L, config: &AppConfig) -> Result<Self, ConfigError> {
        let redirect = Regex::new(&config.portal.redirect_pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: config.portal.redirect_pattern.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            launcher,
            login_url: config.portal.login_url.clone(),
            shows_url: config.portal.shows_url.clone(),
            login: config.portal.login.clone(),
            redirect,
            login_form_timeout: config.timing.login_form_timeout(),
            redirect_timeout: config.timing.redirect_timeout(),
            poll_interval: config.timing.poll_interval(),
            screenshot_dir: config.browser.screenshot_dir.clone(),
            extractor: ListingExtractor::new(&config.portal, &config.timing, config.schema.org_source),
            normalizer: Normalizer::from_config(config),
        })
    }

    /// Screenshot path for a failed login of `identity`
    #[must_use]
    pub fn failure_screenshot_path(&self, identity: &str) -> PathBuf {
        self.screenshot_dir.join(format!("login_failed_{}.png", identity))
    }

    /// Run one full session. The browser is quit whether or not the crawl succeeds.
    pub async fn run(&self, credential: &Credential) -> Result<SessionOutput, SessionError> {
        info!("[{}] Starting session", credential.identity);
        let browser = self.launcher.launch().await?;

        let mut trail = StateTrail::new(&credential.identity);
        let result = self.crawl(&browser, credential, &mut trail).await;

        if let Err(e) = browser.quit().await {
            warn!("[{}] Failed to release browser: {}", credential.identity, e);
        }

        match &result {
            Ok(output) => info!(
                "[{}] Session done: {} shows, {} records, {}",
                credential.identity,
                output.shows,
                output.records.len(),
                output.stats
            ),
            Err(e) => error!("[{}] Session aborted in state {}: {}", credential.identity, trail.current(), e),
        }
        result
    }

    async fn crawl<B: BrowserSession>(
        &self,
        browser: &B,
        credential: &Credential,
        trail: &mut StateTrail,
    ) -> Result<SessionOutput, SessionError> {
        self.log_in(browser, credential, trail).await?;

        browser.navigate(&self.shows_url).await?;
        trail.advance(SessionState::OnShowsPage);
        let shows = self.extractor.list_shows(browser).await?;

        let mut output = SessionOutput {
            identity: credential.identity.clone(),
            records: Vec::new(),
            duplicates: Vec::new(),
            stats: ExtractionStats::default(),
            shows: shows.len(),
            failed_shows: Vec::new(),
            states: Vec::new(),
        };

        for show in &shows {
            trail.advance(SessionState::OnSeancePage { show: show.name.clone() });

            let seances = match self.extractor.seance_rows(browser, show).await {
                Ok(seances) => seances,
                Err(e) => {
                    warn!("[{}] Skipping show '{}': {}", credential.identity, show.name, e);
                    output.failed_shows.push(show.name.clone());
                    continue;
                }
            };
            output.stats.merge(&seances.stats);

            let records: Vec<SeanceRecord> = seances
                .rows
                .into_iter()
                .map(|raw| self.normalizer.normalize(raw))
                .collect();
            for key in Deduplicator::duplicate_keys(&records) {
                warn!("[{}] Duplicate seance within '{}': {}", credential.identity, show.name, key);
            }
            output.records.extend(records);
        }

        trail.advance(SessionState::Done);

        output.duplicates = Deduplicator::duplicate_keys(&output.records);
        if !output.duplicates.is_empty() {
            info!(
                "[{}] {} duplicate keys within session (kept until merge)",
                credential.identity,
                output.duplicates.len()
            );
        }
        output.states = trail.states.clone();
        Ok(output)
    }

    async fn log_in<B: BrowserSession>(
        &self,
        browser: &B,
        credential: &Credential,
        trail: &mut StateTrail,
    ) -> Result<(), SessionError> {
        browser.navigate(&self.login_url).await?;

        wait_until("login form", self.login_form_timeout, self.poll_interval, || async move {
            browser.query(&self.login.email_input).await.map(|e| e.is_some())
        })
        .await?;

        let email = required(browser, &self.login.email_input).await?;
        let password = required(browser, &self.login.password_input).await?;
        let submit = required(browser, &self.login.submit_button).await?;

        email.send_keys(&credential.email).await?;
        password.send_keys(credential.password()).await?;
        submit.click().await?;
        trail.advance(SessionState::LoginSubmitted);

        let redirected = wait_until("post-login redirect", self.redirect_timeout, self.poll_interval, || async move {
            browser.current_url().await.map(|url| self.redirect.is_match(&url))
        })
        .await;

        if let Err(e) = redirected {
            trail.advance(SessionState::LoginFailed);
            let path = self.failure_screenshot_path(&credential.identity);
            let screenshot = match browser.screenshot(&path).await {
                Ok(()) => Some(path),
                Err(shot_err) => {
                    warn!("[{}] Could not capture login screenshot: {}", credential.identity, shot_err);
                    None
                }
            };
            debug!("[{}] Redirect wait ended with: {}", credential.identity, e);
            return Err(SessionError::LoginFailed {
                identity: credential.identity.clone(),
                timeout_secs: self.redirect_timeout.as_secs(),
                screenshot,
            });
        }

        trail.advance(SessionState::Redirected);
        info!("[{}] Logged in", credential.identity);
        Ok(())
    }
}

async fn required<B: BrowserSession>(browser: &B, selector: &str) -> Result<B::Element, BrowserError> {
    browser.query(selector).await?.ok_or_else(|| BrowserError::NoSuchElement {
        selector: selector.to_string(),
    })
}
