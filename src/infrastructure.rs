//! Infrastructure layer for the browser, the ledger, configuration and logging
//!
//! This module provides the capability traits the application layer drives
//! (browser session, ledger tab), their production adapters (WebDriver,
//! Google Sheets), page extraction, configuration loading and logging.

pub mod browser; // Browser capability and bounded waits
pub mod config; // Configuration constants and loading
pub mod ledger_client; // Ledger capability
pub mod logging; // Logging infrastructure
pub mod parsing; // Shows and seance table extraction
pub mod sheets_client; // Google Sheets ledger adapter
pub mod webdriver_client; // W3C WebDriver adapter

// Re-export commonly used items
pub use browser::{wait_until, BrowserError, BrowserLauncher, BrowserResult, BrowserSession, PageElement};
pub use config::{AppConfig, ConfigError, ConfigManager, Credential, CredentialSet, OrgSource};
pub use ledger_client::{LedgerClient, LedgerError, LedgerResult, LedgerTab};
pub use parsing::{ExtractionStats, FieldExtractor, ListingExtractor, RowOutcome, ShowSeances};
pub use sheets_client::SheetsLedger;
pub use webdriver_client::{WebDriverBrowser, WebDriverLauncher};
