use clap::Parser;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;
mod commands;

use cli::{Cli, Commands};
use splunk_logging::config::{Config, LogLevel};
use splunk_logging::{Dispatcher, SplunkHandler, SplunkLogger};

/// Records at or above this level are also forwarded to the collector
const FORWARD_LEVEL: log::LevelFilter = log::LevelFilter::Warn;

fn setup_logging(config: &Config) -> Result<Arc<Dispatcher>> {
    let log_level: &LogLevel = &config.log_level;

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("splunk-logging")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("splunk-logging.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(log_level.as_filter());
    }

    let file_logger = builder.target(env_logger::Target::Pipe(target)).build();
    let max_level = file_logger.filter().max(FORWARD_LEVEL);

    let handler = SplunkHandler::from_config(&config.splunk);
    let dispatcher = Arc::clone(handler.dispatcher());
    SplunkLogger::new(handler, FORWARD_LEVEL)
        .with_inner(Box::new(file_logger))
        .init(max_level)
        .context("Failed to install logger")?;

    info!("Logging initialized, writing to: {}", log_file.display());
    if config.splunk.skips_tls_verification() {
        warn!("TLS certificate verification is disabled for {}", config.splunk.address);
    }
    info!(
        "Log level: {} (from {})",
        log_level.as_filter(),
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(dispatcher)
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Send {
            key,
            name,
            dry_run,
            fields,
        } => commands::send::run(&key, name.as_deref(), &fields, dry_run, &config),
        Commands::Check => commands::check::run(&config),
        Commands::Config { action } => commands::config::run(action, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let dispatcher = setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting splunk-logging with config from: {:?}", cli.config);

    let result = run(cli, config).context("Command failed");

    // Let queued log events go out before exiting
    dispatcher.shutdown();

    result
}
