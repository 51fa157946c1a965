//! Command-line interface.
//!
//! Every option can also be set through a `CERT_STEWARD_*` environment
//! variable (a `.env` file is loaded first by the binary).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    Config, LogFormat, LogLevel, DB_PATH, DEFAULT_CERTBOT_PATH, DEFAULT_LOCK_TIMEOUT_SECS,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_REPAIR_TIMEOUT_SECS, DEFAULT_TICK_INTERVAL_SECS,
    TCP_CONNECT_TIMEOUT_SECS, TLS_HANDSHAKE_TIMEOUT_SECS,
};
use crate::models::{RenewalMode, Severity};

/// Watches TLS certificates and repairs them through certbot under policy control
#[derive(Debug, Parser)]
#[command(name = "cert_steward", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// SQLite database holding domain records
    #[arg(long, global = true, env = "CERT_STEWARD_DB_PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, global = true, value_enum, env = "CERT_STEWARD_LOG_LEVEL", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, global = true, value_enum, env = "CERT_STEWARD_LOG_FORMAT", default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Domains evaluated concurrently by the scheduler
    #[arg(long, global = true, env = "CERT_STEWARD_MAX_CONCURRENCY", default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,

    /// Seconds between scheduled evaluation passes
    #[arg(long, global = true, env = "CERT_STEWARD_TICK_INTERVAL_SECS", default_value_t = DEFAULT_TICK_INTERVAL_SECS)]
    pub tick_interval_secs: u64,

    #[arg(long, global = true, env = "CERT_STEWARD_CONNECT_TIMEOUT_SECS", default_value_t = TCP_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,

    #[arg(long, global = true, env = "CERT_STEWARD_HANDSHAKE_TIMEOUT_SECS", default_value_t = TLS_HANDSHAKE_TIMEOUT_SECS)]
    pub handshake_timeout_secs: u64,

    /// Hard limit for one certbot run
    #[arg(long, global = true, env = "CERT_STEWARD_REPAIR_TIMEOUT_SECS", default_value_t = DEFAULT_REPAIR_TIMEOUT_SECS)]
    pub repair_timeout_secs: u64,

    #[arg(long, global = true, env = "CERT_STEWARD_LOCK_TIMEOUT_SECS", default_value_t = DEFAULT_LOCK_TIMEOUT_SECS)]
    pub lock_timeout_secs: u64,

    #[arg(long, global = true, env = "CERT_STEWARD_CERTBOT_PATH", default_value = DEFAULT_CERTBOT_PATH)]
    pub certbot_path: PathBuf,

    /// ACME account contact passed to certbot
    #[arg(long, global = true, env = "CERT_STEWARD_CONTACT_EMAIL")]
    pub contact_email: Option<String>,

    /// Extra argument appended to every certbot run (repeatable)
    #[arg(long = "certbot-arg", global = true, allow_hyphen_values = true)]
    pub certbot_args: Vec<String>,

    /// Issue an HTTP HEAD probe alongside every inspection
    #[arg(long, global = true, env = "CERT_STEWARD_PROBE_HTTP")]
    pub probe_http: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler (and the HTTP API when --api-bind is set)
    Serve {
        /// Address for the HTTP API
        #[arg(long, env = "CERT_STEWARD_API_BIND")]
        api_bind: Option<SocketAddr>,

        /// Domain to evaluate on every tick, in addition to stored ones
        #[arg(long = "domain", env = "CERT_STEWARD_DOMAINS", value_delimiter = ',')]
        domains: Vec<String>,
    },
    /// Print the stored state of a domain
    State { domain: String },
    /// Inspect a domain now and store the observation
    Observe { domain: String },
    /// Run one full observe, decide, repair cycle
    Evaluate {
        domain: String,
        /// Overrides the severity assumed from the observation
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// Set the renewal mode (monitor_only, assisted, autonomous, locked)
    SetMode { domain: String, mode: RenewalMode },
    /// Approve the next repair of an assisted domain
    Approve { domain: String },
    /// Clear failure counters, cooldown, escalation, and attempts
    Reset { domain: String },
    /// Run certbot with --dry-run; nothing is counted
    DryRun { domain: String },
    /// Print the transition journal, newest first
    History {
        domain: String,
        #[arg(long)]
        limit: Option<u32>,
    },
}

impl Cli {
    /// Library configuration for this invocation.
    pub fn to_config(&self) -> Config {
        let options = &self.options;
        let (api_bind, domains) = match &self.command {
            Command::Serve { api_bind, domains } => (*api_bind, domains.clone()),
            _ => (None, Vec::new()),
        };
        Config {
            db_path: options.db_path.clone(),
            log_level: options.log_level.clone(),
            log_format: options.log_format.clone(),
            max_concurrency: options.max_concurrency,
            tick_interval: Duration::from_secs(options.tick_interval_secs),
            connect_timeout: Duration::from_secs(options.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(options.handshake_timeout_secs),
            repair_timeout: Duration::from_secs(options.repair_timeout_secs),
            lock_timeout: Duration::from_secs(options.lock_timeout_secs),
            certbot_path: options.certbot_path.clone(),
            contact_email: options.contact_email.clone(),
            certbot_args: options.certbot_args.clone(),
            domains,
            api_bind,
            probe_http: options.probe_http,
        }
    }
}
