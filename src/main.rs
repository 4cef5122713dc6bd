use anyhow::Result;
use dotenvy::dotenv;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tokio::time::interval;

use mediadrop::core::{config, init_logger, log_pipeline_configuration, metrics};
use mediadrop::download::janitor::Janitor;
use mediadrop::download::source::SourceRegistry;
use mediadrop::download::{MediaPipeline, PipelineConfig};
use mediadrop::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (logging, scratch directory, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Set up global panic handler so a panicking task is logged, not silently lost
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // Load environment variables from .env if present
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    run_bot().await
}

async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");

    metrics::init_metrics();
    log_pipeline_configuration();

    let pipeline_config = PipelineConfig::from_env();
    std::fs::create_dir_all(&pipeline_config.scratch_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create scratch directory {}: {}",
            pipeline_config.scratch_dir.display(),
            e
        )
    })?;

    let janitor = Janitor::new(pipeline_config.scratch_dir.clone());
    let removed = janitor.sweep_stale(Duration::ZERO);
    if removed > 0 {
        log::info!("Removed {} scratch file(s) left by a previous run", removed);
    }
    start_scratch_sweeper(janitor, pipeline_config.stale_scratch_age());

    let bot = create_bot()?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let deps = HandlerDeps::new(MediaPipeline::new(pipeline_config), SourceRegistry::default_registry());
    let handler = schema(deps);

    // Drop updates that piled up while the bot was offline
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher shutdown gracefully");
    log::debug!("Final metrics:\n{}", metrics::gather_metrics());
    Ok(())
}

/// Periodically removes scratch files that outlived any possible request.
fn start_scratch_sweeper(janitor: Janitor, max_age: Duration) {
    log::info!("Sweeping scratch files older than {}s every hour", max_age.as_secs());
    tokio::spawn(async move {
        let mut ticker = interval(SWEEP_INTERVAL);
        // first tick fires immediately, the startup sweep already ran
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = janitor.sweep_stale(max_age);
            if removed > 0 {
                log::info!("🧹 Swept {} stale scratch file(s)", removed);
            }
        }
    });
}
