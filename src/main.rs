//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `cert_steward` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Exit status
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use cert_steward::cli::Cli;
use cert_steward::initialization::{init_crypto_provider, init_logger_with};
use cert_steward::run_command;

#[tokio::main]
async fn main() -> Result<()> {
    // Load CERT_STEWARD_* settings from .env in the current directory first,
    // then from the executable's directory
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let cli = Cli::parse();
    let config = cli.to_config();

    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;

    // Process-wide provider for reqwest; the inspector carries its own
    init_crypto_provider();

    if let Err(e) = run_command(cli.command, config).await {
        eprintln!("cert_steward error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}
