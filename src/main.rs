//! seance-sync command line entry point
//!
//! Loads `creds/.env`, the layered configuration and the credentials, runs
//! every session, reconciles the ledger and prints the run summary. Exits
//! non-zero when any session failed or an error reaches the top level.

use std::process::ExitCode;

use anyhow::{ensure, Context, Result};
use tracing::{error, info, warn};

use seance_sync_lib::application::{Reconciler, SeanceSyncService, SessionRunner};
use seance_sync_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use seance_sync_lib::infrastructure::{ConfigManager, CredentialSet, SheetsLedger, WebDriverLauncher};

const CREDENTIALS_ENV_FILE: &str = "creds/.env";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let env_file = dotenv::from_path(CREDENTIALS_ENV_FILE);

    let manager = ConfigManager::new()?;
    let config = manager.load_config()?;
    init_logging_with_config(&config.logging, config.ledger.site_offset()?)?;
    log_system_info();

    if manager.config_path().exists() {
        info!("Loaded configuration from: {:?}", manager.config_path());
    } else {
        info!("Configuration file not found, using defaults: {:?}", manager.config_path());
    }

    match env_file {
        Ok(()) => info!("Loaded credentials from {}", CREDENTIALS_ENV_FILE),
        Err(e) => warn!("{} not loaded ({}); using process environment", CREDENTIALS_ENV_FILE, e),
    }

    let credentials = CredentialSet::from_env(&config.credentials.identities)?;
    info!("{} credentials configured", credentials.len());

    ensure!(
        !config.ledger.spreadsheet.trim().is_empty(),
        "ledger.spreadsheet is not configured"
    );
    let ledger = SheetsLedger::from_config(&config.ledger)?;
    let launcher = WebDriverLauncher::new(config.browser.clone()).context("Failed to create WebDriver client")?;
    let runner = SessionRunner::new(launcher, &config)?;
    let reconciler = Reconciler::from_config(&config.ledger)?;

    let service = SeanceSyncService::new(runner, ledger, config.ledger.clone(), reconciler);
    let summary = service
        .run(&credentials)
        .await
        .context("Ledger reconciliation failed")?;

    println!("{}", summary.render_table());

    if summary.has_failures() {
        let failed: Vec<_> = summary.failed.iter().map(|f| f.identity.as_str()).collect();
        error!("Sessions failed: {}", failed.join(", "));
        return Ok(ExitCode::FAILURE);
    }

    info!("Run complete");
    Ok(ExitCode::SUCCESS)
}
