//! Configuration types.
//!
//! This module defines the library configuration struct and the enums shared
//! with command-line parsing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;

use crate::config::constants::*;
use crate::error_handling::ConfigError;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Library configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use cert_steward::Config;
///
/// let config = Config {
///     contact_email: Some("ops@example.com".to_string()),
///     domains: vec!["example.com".to_string()],
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Database path (SQLite file)
    pub db_path: PathBuf,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,

    /// Domains evaluated concurrently by the scheduler
    pub max_concurrency: usize,

    /// Interval between scheduled evaluation passes
    pub tick_interval: Duration,

    /// TCP connect timeout for inspections
    pub connect_timeout: Duration,

    /// TLS handshake timeout for inspections
    pub handshake_timeout: Duration,

    /// Hard deadline for one repair tool invocation
    pub repair_timeout: Duration,

    /// Deadline for acquiring a per-domain lock
    pub lock_timeout: Duration,

    /// Path to the certbot binary
    pub certbot_path: PathBuf,

    /// ACME account contact; live repairs refuse to run without it
    pub contact_email: Option<String>,

    /// Extra arguments appended to every certbot invocation
    pub certbot_args: Vec<String>,

    /// Domains the scheduler evaluates in addition to the stored ones
    pub domains: Vec<String>,

    /// Address for the HTTP API (disabled when `None`)
    pub api_bind: Option<SocketAddr>,

    /// Issue an HTTP probe alongside every inspection
    pub probe_http: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_PATH),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
            repair_timeout: Duration::from_secs(DEFAULT_REPAIR_TIMEOUT_SECS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            certbot_path: PathBuf::from(DEFAULT_CERTBOT_PATH),
            contact_email: None,
            certbot_args: Vec::new(),
            domains: Vec::new(),
            api_bind: None,
            probe_http: false,
        }
    }
}

impl Config {
    /// Checks value ranges. Never panics; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrency,
                max: MAX_CONCURRENCY_LIMIT,
            });
        }
        let repair_secs = self.repair_timeout.as_secs();
        if !(MIN_REPAIR_TIMEOUT_SECS..=MAX_REPAIR_TIMEOUT_SECS).contains(&repair_secs) {
            return Err(ConfigError::InvalidTimeout {
                name: "repair_timeout",
                secs: repair_secs,
            });
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("lock_timeout", self.lock_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout { name, secs: 0 });
            }
        }
        if self.tick_interval.as_secs() < MIN_TICK_INTERVAL_SECS {
            return Err(ConfigError::InvalidTimeout {
                name: "tick_interval",
                secs: self.tick_interval.as_secs(),
            });
        }
        if let Some(email) = &self.contact_email {
            if !EMAIL_PATTERN.is_match(email) {
                return Err(ConfigError::InvalidContactEmail(email.clone()));
            }
        }
        Ok(())
    }

    /// Total time an inspection may take (connect + handshake).
    pub fn inspect_timeout(&self) -> Duration {
        self.connect_timeout + self.handshake_timeout
    }

    /// Deadline for one full orchestrator cycle.
    ///
    /// Covers the pre-repair inspection, the tool run, the post-repair
    /// inspection, and waiting for the domain lock.
    pub fn cycle_timeout(&self) -> Duration {
        self.repair_timeout + self.inspect_timeout() * 2 + self.lock_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.repair_timeout, Duration::from_secs(180));
        assert_eq!(config.db_path, PathBuf::from("./cert_steward.db"));
        assert!(config.contact_email.is_none());
        assert!(config.api_bind.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency { value: 0, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_concurrency() {
        let config = Config {
            max_concurrency: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_repair_timeout() {
        let config = Config {
            repair_timeout: Duration::from_secs(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                name: "repair_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_short_tick_interval() {
        let config = Config {
            tick_interval: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_contact_email() {
        let good = Config {
            contact_email: Some("ops@example.com".to_string()),
            ..Default::default()
        };
        assert!(good.validate().is_ok());

        let bad = Config {
            contact_email: Some("not an email".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidContactEmail(_))
        ));
    }

    #[test]
    fn test_cycle_timeout_covers_all_phases() {
        let config = Config::default();
        assert_eq!(
            config.cycle_timeout(),
            Duration::from_secs(180 + 2 * 10 + 30)
        );
    }
}
