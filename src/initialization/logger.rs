//! Logger initialization.
//!
//! This module configures `env_logger` with the plain (coloured) or JSON line format.

use std::io::Write;

use crate::config::LogFormat;
use crate::error_handling::InitializationError;
use colored::*;
use log::LevelFilter;

/// Dependency targets that are clamped regardless of the requested level.
const NOISY_TARGETS: &[(&str, LevelFilter)] = &[
    ("sqlx", LevelFilter::Warn),
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("rustls", LevelFilter::Warn),
    ("tokio_rustls", LevelFilter::Warn),
];

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first; the provided `level` overrides it for the crate's
/// own target, so `RUST_LOG=cert_steward::repair=trace` style filters still
/// work for everything else.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug cert_steward serve
/// cert_steward --log-level debug --log-format json serve
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(matches!(format, LogFormat::Plain));

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (target, ceiling) in NOISY_TARGETS {
        builder.filter_module(target, (*ceiling).min(level));
    }
    builder.filter_module("cert_steward", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":{}}}",
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    record.level(),
                    record.target(),
                    serde_json::to_string(&record.args().to_string())
                        .unwrap_or_else(|_| "\"\"".into())
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let (emoji, colored_level) = match level {
                    log::Level::Error => ("❌", level.to_string().red()),
                    log::Level::Warn => ("⚠️", level.to_string().yellow()),
                    log::Level::Info => ("🔒", level.to_string().green()),
                    log::Level::Debug => ("🔍", level.to_string().blue()),
                    log::Level::Trace => ("🔬", level.to_string().purple()),
                };

                writeln!(
                    buf,
                    "{} {} [{}] {}",
                    emoji,
                    record.target().cyan(),
                    colored_level,
                    record.args()
                )
            });
        }
    }

    // try_init so repeated initialization in tests returns an error instead of panicking
    builder.try_init().map_err(InitializationError::from)?;

    Ok(())
}
