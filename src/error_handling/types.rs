//! Error type definitions.
//!
//! This module defines the error enums of every layer plus the classified
//! reason codes attached to observations and cycle outcomes.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP probe client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error building the TLS client configuration.
    #[error("TLS configuration error: {0}")]
    TlsConfigError(String),
}

/// Configuration values outside their accepted range.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_concurrency must be between 1 and {max}, got {value}")]
    InvalidConcurrency { value: usize, max: usize },

    #[error("{name} is out of range ({secs}s)")]
    InvalidTimeout { name: &'static str, secs: u64 },

    #[error("contact email is not a valid address: {0}")]
    InvalidContactEmail(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A stored record could not be encoded or decoded.
    #[error("Record serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Another writer committed the record after it was read.
    #[error("Record for {domain} was modified concurrently")]
    WriteConflict { domain: String },
}

impl DatabaseError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::WriteConflict { .. })
    }
}

/// Raw input that does not resolve to a usable hostname.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,

    #[error("cannot parse domain from '{0}'")]
    Unparsable(String),

    #[error("IP addresses are not supported: {0}")]
    IpAddress(String),

    #[error("domain is too long ({0} characters)")]
    TooLong(usize),

    #[error("invalid domain label '{0}'")]
    InvalidLabel(String),
}

/// Error types for the domain state store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error("timed out after {secs}s waiting for the lock on {domain}")]
    LockTimeout { domain: String, secs: u64 },

    #[error("persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("state store writes are suspended after repeated failures")]
    CircuitOpen,
}

/// Failures of the external certificate tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("certificate tool not found: {0}")]
    NotFound(String),

    #[error("failed to run certificate tool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("certificate tool timed out after {0}s")]
    Timeout(u64),

    #[error("certificate tool run was cancelled")]
    Cancelled,

    #[error("no contact email configured for live repairs")]
    MissingContact,
}

impl ToolError {
    /// Reason code stored on the attempt record.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "tool_not_found",
            ToolError::Spawn(_) => "tool_spawn_failed",
            ToolError::Timeout(_) => "tool_timeout",
            ToolError::Cancelled => "cancelled",
            ToolError::MissingContact => "missing_contact_email",
        }
    }
}

/// Classified reasons an inspection did not yield a trusted certificate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InspectErrorKind {
    InvalidHostname,
    DnsResolutionFailed,
    ConnectionRefused,
    ConnectTimeout,
    HandshakeTimeout,
    HandshakeFailed,
    CertificateExpired,
    CertificateNotYetValid,
    HostnameMismatch,
    UntrustedIssuer,
    CertificateRevoked,
    InvalidCertificate,
    NoPeerCertificate,
    UnparsableCertificate,
    IoError,
    /// The inspector itself failed unexpectedly
    InternalError,
}

impl std::fmt::Display for InspectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InspectErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorKind::InvalidHostname => "invalid_hostname",
            InspectErrorKind::DnsResolutionFailed => "dns_resolution_failed",
            InspectErrorKind::ConnectionRefused => "connection_refused",
            InspectErrorKind::ConnectTimeout => "connect_timeout",
            InspectErrorKind::HandshakeTimeout => "handshake_timeout",
            InspectErrorKind::HandshakeFailed => "handshake_failed",
            InspectErrorKind::CertificateExpired => "certificate_expired",
            InspectErrorKind::CertificateNotYetValid => "certificate_not_yet_valid",
            InspectErrorKind::HostnameMismatch => "hostname_mismatch",
            InspectErrorKind::UntrustedIssuer => "untrusted_issuer",
            InspectErrorKind::CertificateRevoked => "certificate_revoked",
            InspectErrorKind::InvalidCertificate => "invalid_certificate",
            InspectErrorKind::NoPeerCertificate => "no_peer_certificate",
            InspectErrorKind::UnparsableCertificate => "unparsable_certificate",
            InspectErrorKind::IoError => "io_error",
            InspectErrorKind::InternalError => "internal_error",
        }
    }

    /// Whether the failure happened before any certificate was seen.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            InspectErrorKind::InvalidHostname
                | InspectErrorKind::DnsResolutionFailed
                | InspectErrorKind::ConnectionRefused
                | InspectErrorKind::ConnectTimeout
                | InspectErrorKind::HandshakeTimeout
                | InspectErrorKind::HandshakeFailed
                | InspectErrorKind::IoError
        )
    }
}

/// How one orchestrator cycle ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcomeKind {
    /// Certificate healthy, nothing to do
    Healthy,
    /// Policy engine denied the repair
    Blocked,
    /// Repair ran and verification passed
    Repaired,
    /// Repair ran and failed (tool, verification, or internal error)
    RepairFailed,
    /// Another repair for the domain was already in flight
    RepairRejected,
    /// The domain lock could not be acquired before the deadline
    Busy,
    /// The cycle could not persist its result
    Degraded,
}

impl CycleOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcomeKind::Healthy => "healthy",
            CycleOutcomeKind::Blocked => "blocked",
            CycleOutcomeKind::Repaired => "repaired",
            CycleOutcomeKind::RepairFailed => "repair_failed",
            CycleOutcomeKind::RepairRejected => "repair_rejected",
            CycleOutcomeKind::Busy => "busy",
            CycleOutcomeKind::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for CycleOutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
