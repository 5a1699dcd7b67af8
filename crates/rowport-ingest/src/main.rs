//! Rowport - tabular ingestion tool

use anyhow::Result;
use clap::Parser;
use rowport_common::logging::{init_logging, LogConfig, LogLevel};
use rowport_ingest::cli::{execute, Cli};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("rowport".to_string())
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;
    debug!(command = ?cli.command, "Starting");

    let output = execute(cli.command).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
