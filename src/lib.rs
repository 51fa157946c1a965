//! cert_steward library: autonomous TLS certificate health and repair
//!
//! The agent inspects the certificate each domain serves, keeps one durable
//! record per domain, and decides through a fixed policy whether the
//! certificate tool (certbot) may run. Repairs are verified by a second
//! inspection, failures back off exponentially and escalate, and every
//! transition is journaled.
//!
//! # Example
//!
//! ```no_run
//! use cert_steward::{build_orchestrator, Config, RenewalMode};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     contact_email: Some("ops@example.com".to_string()),
//!     ..Default::default()
//! };
//! let orchestrator = build_orchestrator(&config).await?;
//! orchestrator
//!     .set_renewal_mode("example.com", RenewalMode::Autonomous)
//!     .await?;
//!
//! let report = orchestrator
//!     .evaluate("example.com", None, &CancellationToken::new())
//!     .await?;
//! println!("{}: {}", report.domain, report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

pub mod api_server;
pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error_handling;
pub mod initialization;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub mod repair;
pub mod scheduler;
pub mod storage;
pub mod tls;

// Re-export public API
pub use app::{build_orchestrator, run_command};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LogFormat, LogLevel};
pub use domain::normalize_domain;
pub use error_handling::{CycleOutcomeKind, CycleStats, DomainError, StoreError};
pub use models::{
    AttemptOutcome, DomainRecord, EscalationLevel, HealthState, Observation, PolicyDecision,
    PolicyReason, RenewalMode, RepairAttempt, Severity,
};
pub use orchestrator::{CycleReport, DryRunReport, Orchestrator};
pub use repair::{CertbotTool, RepairTool, RunMode, ToolRun};
pub use scheduler::Scheduler;
pub use storage::{run_migrations, DomainStateStore, MemoryBackend, StateBackend};
pub use tls::{CertificateInspector, TlsInspector};
