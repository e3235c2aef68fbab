//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Console and file output support
//! - Configuration based log level control (overridable with `RUST_LOG`)
//! - Structured JSON logging for the file layer (optional)
//! - Log files stored relative to executable location, rotated on start-up
//! - Site-local timestamps

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Current log file name; older runs are renamed with a timestamp suffix
pub const LOG_FILE_NAME: &str = "seance-sync.log";

// Keeps the non-blocking file writer alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Renders event timestamps in the site-local UTC offset
#[derive(Debug, Clone, Copy)]
struct SiteTimeFormatter {
    offset: FixedOffset,
}

impl FormatTime for SiteTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let site_time = Utc::now().with_timezone(&self.offset);
        write!(w, "{}", site_time.format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Rename an existing log file with its modification timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str, offset: FixedOffset) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);

    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path).map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;

    let file_time = metadata
        .modified()
        .unwrap_or_else(|_| std::time::SystemTime::now());

    let datetime: chrono::DateTime<Utc> = file_time.into();
    let site_datetime = datetime.with_timezone(&offset);

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, site_datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(())
}

/// Base filter: `RUST_LOG` wins, otherwise configured level plus module directives
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);

        if !config.level.to_lowercase().contains("trace") {
            for (module, level) in &config.module_filters {
                match format!("{}={}", module, level).parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(e) => eprintln!("Ignoring invalid log filter {}={}: {}", module, level, e),
                }
            }
        }

        filter
    })
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// # Show detailed HTTP logs for WebDriver and ledger traffic
/// RUST_LOG="debug,reqwest=debug,hyper=debug" seance-sync
/// ```
pub fn init_logging_with_config(config: &LoggingConfig, offset: FixedOffset) -> Result<()> {
    let timer = SiteTimeFormatter { offset };
    let log_dir = get_log_directory();

    if config.file_output {
        std::fs::create_dir_all(&log_dir).map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        rotate_existing_log_file(&log_dir, LOG_FILE_NAME, offset)?;
    }

    let file_layer = if config.file_output {
        let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = non_blocking(file_appender);

        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(timer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(timer)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(timer)
            .with_target(false)
    });

    if file_layer.is_none() && console_layer.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(build_env_filter(config))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }

    if config.file_output && config.auto_cleanup_logs {
        cleanup_old_logs(&log_dir, config.max_files)?;
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Seance Sync System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("======================================");
}

/// Keep at most `max_files` log files, newest first
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".log"));
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = max_files as usize;
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            info!("Removed old log file: {:?}", path);
            removed += 1;
        }
    }

    Ok(removed)
}
