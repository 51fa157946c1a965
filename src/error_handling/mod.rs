//! Error handling and cycle statistics.
//!
//! This module provides:
//! - Error type definitions for every layer
//! - Classification of TLS and network failures into reason codes
//! - Retry strategy configuration for state store commits
//! - Cycle outcome statistics
//!
//! Policy denials are not errors: they travel as `PolicyDecision` values.
//! Only failures of infrastructure (network, tool, persistence) are typed here.

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{
    categorize_certificate_error, categorize_handshake_error, categorize_io_error,
    get_retry_strategy,
};
pub use stats::{CycleStats, CycleStatsSnapshot};
pub use types::{
    ConfigError, CycleOutcomeKind, DatabaseError, DomainError, InitializationError,
    InspectErrorKind, StoreError, ToolError,
};
