//! Configuration infrastructure
//!
//! Contains configuration loading for the portal crawl and ledger sync.
//!
//! Configuration is layered:
//! 1. Built-in defaults (`defaults` module)
//! 2. Optional TOML file (`SEANCE_SYNC_CONFIG` or `<config dir>/seance-sync/config.toml`)
//! 3. Environment overrides (`SEANCE_SYNC__LEDGER__TAB=...`)
//!
//! Credentials are kept out of the file and read per identity from the
//! environment (`USER1_EMAIL`, `USER1_PASSWORD`, ...).

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LedgerColumns;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Credential '{identity}' is missing required field '{field}'")]
    MissingCredential { identity: String, field: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub timing: TimingConfig,
    pub browser: BrowserConfig,
    pub ledger: LedgerConfig,
    pub schema: SchemaConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

/// Ticketing portal addresses and page selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Host prepended to relative detail links
    pub base_url: String,
    pub login_url: String,
    pub shows_url: String,
    /// Regex over the current URL that signals a successful login redirect
    pub redirect_pattern: String,
    /// Frame some seance pages wrap their table in
    pub content_frame_id: String,
    pub login: LoginSelectors,
    pub listing: ListingSelectors,
    pub fields: SeanceFieldSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub email_input: String,
    pub password_input: String,
    pub submit_button: String,
}

/// Selectors for the shows page and seance tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Rows of the shows table (row role)
    pub show_row: String,
    /// Marks a row as a header row when present inside it
    pub header_cell: String,
    pub show_name: String,
    pub details_link: String,
    /// Body rows of a show's seance table
    pub seance_row: String,
}

/// Cell selectors of one seance row, one per semantic column label
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeanceFieldSelectors {
    pub city: String,
    pub hall: String,
    pub date: String,
    pub time: String,
    pub sold: String,
    pub available: String,
    pub producer: String,
}

/// Bounded wait points of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub login_form_timeout_secs: u64,
    pub redirect_timeout_secs: u64,
    pub table_timeout_secs: u64,
    pub frame_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl TimingConfig {
    #[must_use]
    pub const fn login_form_timeout(&self) -> Duration {
        Duration::from_secs(self.login_form_timeout_secs)
    }

    #[must_use]
    pub const fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    #[must_use]
    pub const fn table_timeout(&self) -> Duration {
        Duration::from_secs(self.table_timeout_secs)
    }

    #[must_use]
    pub const fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// WebDriver endpoint and browser flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub extra_args: Vec<String>,
    /// Where login failure screenshots go
    pub screenshot_dir: PathBuf,
}

impl BrowserConfig {
    /// Chrome arguments for a new session
    #[must_use]
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.headless {
            args.push("--headless".to_string());
        }
        for arg in &self.extra_args {
            if !args.contains(arg) {
                args.push(arg.clone());
            }
        }
        args
    }
}

/// Ledger location, columns and reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub api_base: String,
    /// Spreadsheet key
    pub spreadsheet: String,
    pub tab: String,
    /// Environment variable holding the API bearer token
    pub access_token_env: String,
    pub columns: LedgerColumns,
    /// Only records of this organization are reconciled
    pub target_org_label: String,
    /// Site-local time zone as a fixed UTC offset
    pub site_utc_offset_hours: i32,
    /// `chrono` format of the last-updated cell
    pub timestamp_format: String,
}

impl LedgerConfig {
    pub fn site_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.site_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                field: "ledger.site_utc_offset_hours".to_string(),
                reason: format!("{} is not a valid UTC offset", self.site_utc_offset_hours),
            })
    }

    pub fn validate_timestamp_format(&self) -> Result<(), ConfigError> {
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid {
                field: "ledger.timestamp_format".to_string(),
                reason: format!("'{}' is not a valid timestamp format", self.timestamp_format),
            });
        }
        Ok(())
    }
}

/// Where a record's organization label comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgSource {
    /// Every record gets `ledger.target_org_label`
    #[default]
    Fixed,
    /// Read from the producer cell of each seance row
    Page,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub org_source: OrgSource,
}

/// Identities whose credentials are read from the environment, in run order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub identities: Vec<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the log file
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: portal::BASE_URL.to_string(),
            login_url: portal::LOGIN_URL.to_string(),
            shows_url: portal::SHOWS_URL.to_string(),
            redirect_pattern: portal::REDIRECT_PATTERN.to_string(),
            content_frame_id: portal::CONTENT_FRAME_ID.to_string(),
            login: LoginSelectors::default(),
            listing: ListingSelectors::default(),
            fields: SeanceFieldSelectors::default(),
        }
    }
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            email_input: "input[type='email'], input[name='email']".to_string(),
            password_input: "input[type='password']".to_string(),
            submit_button: "button[type='submit']".to_string(),
        }
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            show_row: "[role='row']".to_string(),
            header_cell: "[role='columnheader'], th".to_string(),
            show_name: "[role='cell'][data-label='Show']".to_string(),
            details_link: "a[href]".to_string(),
            seance_row: "tbody tr".to_string(),
        }
    }
}

impl Default for SeanceFieldSelectors {
    fn default() -> Self {
        Self {
            city: "td[data-label='City']".to_string(),
            hall: "td[data-label='Hall']".to_string(),
            date: "td[data-label='Date']".to_string(),
            time: "td[data-label='Time']".to_string(),
            sold: "td[data-label='Sold']".to_string(),
            available: "td[data-label='Available']".to_string(),
            producer: "td[data-label='Producer']".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            login_form_timeout_secs: defaults::LOGIN_FORM_TIMEOUT_SECS,
            redirect_timeout_secs: defaults::REDIRECT_TIMEOUT_SECS,
            table_timeout_secs: defaults::TABLE_TIMEOUT_SECS,
            frame_timeout_secs: defaults::FRAME_TIMEOUT_SECS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: defaults::WEBDRIVER_URL.to_string(),
            headless: true,
            extra_args: defaults::CHROME_ARGS.iter().map(|s| (*s).to_string()).collect(),
            screenshot_dir: PathBuf::from(defaults::SCREENSHOT_DIR),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::SHEETS_API_BASE.to_string(),
            spreadsheet: String::new(),
            tab: defaults::LEDGER_TAB.to_string(),
            access_token_env: defaults::ACCESS_TOKEN_ENV.to_string(),
            columns: LedgerColumns::default(),
            target_org_label: defaults::TARGET_ORG_LABEL.to_string(),
            site_utc_offset_hours: defaults::SITE_UTC_OFFSET_HOURS,
            timestamp_format: defaults::TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            identities: defaults::IDENTITIES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Fail fast on values that would only blow up mid-crawl
    pub fn validate(&self) -> Result<(), ConfigError> {
        Regex::new(&self.portal.redirect_pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: self.portal.redirect_pattern.clone(),
            reason: e.to_string(),
        })?;

        if self.ledger.target_org_label.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ledger.target_org_label".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.credentials.identities.is_empty() {
            return Err(ConfigError::Invalid {
                field: "credentials.identities".to_string(),
                reason: "at least one identity is required".to_string(),
            });
        }

        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.poll_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        self.ledger.site_offset()?;
        self.ledger.validate_timestamp_format()?;
        Ok(())
    }
}

/// One portal login
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity: String,
    pub email: String,
    password: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Ordered credentials, one session each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet(Vec<Credential>);

impl CredentialSet {
    /// Build from `<IDENTITY>_EMAIL` / `<IDENTITY>_PASSWORD` keys.
    /// Any blank or absent field is an error.
    pub fn from_lookup<F>(identities: &[String], lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials = Vec::with_capacity(identities.len());

        for identity in identities {
            let read = |field: &str| {
                lookup(&format!("{identity}_{field}"))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ConfigError::MissingCredential {
                        identity: identity.clone(),
                        field: field.to_string(),
                    })
            };
            let email = read("EMAIL")?;
            let password = read("PASSWORD")?;
            credentials.push(Credential::new(identity.clone(), email, password));
        }

        Ok(Self(credentials))
    }

    pub fn from_env(identities: &[String]) -> Result<Self, ConfigError> {
        Self::from_lookup(identities, |key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Credential> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Credential>> for CredentialSet {
    fn from(credentials: Vec<Credential>) -> Self {
        Self(credentials)
    }
}

impl<'a> IntoIterator for &'a CredentialSet {
    type Item = &'a Credential;
    type IntoIter = std::slice::Iter<'a, Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Configuration manager for locating and loading settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Environment variable naming an explicit config file
    pub const CONFIG_PATH_ENV: &'static str = "SEANCE_SYNC_CONFIG";

    /// Environment prefix for overrides
    pub const ENV_PREFIX: &'static str = "SEANCE_SYNC";

    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("seance-sync");

        Ok(config_dir)
    }

    /// Manager for `SEANCE_SYNC_CONFIG`, or the per-user config file
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var_os(Self::CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::get_config_dir()?.join("config.toml"),
        };

        Ok(Self { config_path })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load defaults, then the file if it exists, then environment overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", self.config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Ticketing portal addresses used when no config file overrides them
pub mod portal {
    /// Portal host, prepended to relative links
    pub const BASE_URL: &str = "https://portal.example.com";

    pub const LOGIN_URL: &str = "https://portal.example.com/login";

    pub const SHOWS_URL: &str = "https://portal.example.com/organizer/shows";

    /// Landing pages reached only after a successful login
    pub const REDIRECT_PATTERN: &str = r"^https://portal\.example\.com/(organizer|dashboard)";

    pub const CONTENT_FRAME_ID: &str = "contentFrame";
}

/// Default configuration values
pub mod defaults {
    pub const LOGIN_FORM_TIMEOUT_SECS: u64 = 20;

    pub const REDIRECT_TIMEOUT_SECS: u64 = 30;

    pub const TABLE_TIMEOUT_SECS: u64 = 20;

    /// Short: many seance pages have no frame at all
    pub const FRAME_TIMEOUT_SECS: u64 = 5;

    pub const POLL_INTERVAL_MS: u64 = 250;

    pub const WEBDRIVER_URL: &str = "http://localhost:9515";

    /// Added after `--headless` when headless is on
    pub const CHROME_ARGS: &[&str] = &["--disable-gpu"];

    pub const SCREENSHOT_DIR: &str = "screenshots";

    pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

    pub const LEDGER_TAB: &str = "Seances";

    pub const ACCESS_TOKEN_ENV: &str = "LEDGER_ACCESS_TOKEN";

    pub const TARGET_ORG_LABEL: &str = "Bravo";

    /// Istanbul, no DST
    pub const SITE_UTC_OFFSET_HOURS: i32 = 3;

    pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

    pub const IDENTITIES: &[&str] = &["USER1", "USER2"];

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = true;

    pub const LOG_MAX_FILES: u32 = 5;

    pub const LOG_AUTO_CLEANUP: bool = true;
}
