//! Command-line entry point for Loxbridge.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use loxbridge::logging::json_from_env;
use loxbridge::{init_logging, Bridge, BridgeConfig, LogOptions, DEFAULT_CONFIG_PATH, VERSION};
use tracing::info;

/// Bridge a Loxone Miniserver (UDP) to an MQTT smart-home bus.
#[derive(Parser, Debug)]
#[command(name = "loxbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file.
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Log JSON lines (also enabled by LOXBRIDGE_LOG_JSON=true).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Cannot start with {}", args.config.display()))?;

    let _guard = init_logging(&LogOptions {
        verbose: args.verbose,
        json: args.log_json || config.log.json || json_from_env(),
        directory: config.log.directory.clone(),
    })?;

    info!(version = VERSION, config = %args.config.display(), "Starting loxbridge");

    let bridge = Bridge::from_config(&config)?;
    bridge.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    bridge.shutdown().await;
    Ok(())
}
