//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup summary of the pipeline configuration

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective pipeline configuration at application startup.
pub fn log_pipeline_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("📦 Media pipeline configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("yt-dlp binary:      {}", config::YTDL_BIN.as_str());
    log::info!("scratch directory:  {}", config::TEMP_FILES_DIR.as_str());
    log::info!(
        "upload limit:       {:.0} MB",
        config::validation::max_upload_bytes() as f64 / (1024.0 * 1024.0)
    );
    log::info!(
        "timeouts:           probe={}s attempt={}s upload={}s budget={}s",
        config::download::probe_timeout().as_secs(),
        config::download::attempt_timeout().as_secs(),
        config::delivery::upload_timeout().as_secs(),
        config::download::request_budget().as_secs()
    );
    log::info!("delivery attempts:  {}", *config::delivery::MAX_ATTEMPTS);

    if config::BOT_TOKEN.is_empty() {
        log::error!("❌ BOT_TOKEN / TELOXIDE_TOKEN not set - the bot cannot start");
    }
}
