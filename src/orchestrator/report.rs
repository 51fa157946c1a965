//! Structured results of orchestrator operations.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::CycleOutcomeKind;
use crate::models::{DomainRecord, Observation, PolicyDecision, RepairAttempt, Severity};
use crate::repair::RepairResult;

/// Result of one `evaluate` cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub domain: String,
    pub outcome: CycleOutcomeKind,
    pub observation: Option<Observation>,
    pub severity: Option<Severity>,
    /// Absent when the certificate was healthy
    pub decision: Option<PolicyDecision>,
    /// Audit entry appended by this cycle, if any
    pub attempt: Option<RepairAttempt>,
    /// Earliest time a blocked or failed domain may be retried
    pub retry_after: Option<DateTime<Utc>>,
    /// Set when the result could not be made durable
    pub warning: Option<String>,
    /// Record as committed at the end of the cycle
    pub record: DomainRecord,
}

impl CycleReport {
    pub fn is_blocked(&self) -> bool {
        self.outcome == CycleOutcomeKind::Blocked
    }

    pub fn repaired(&self) -> bool {
        self.outcome == CycleOutcomeKind::Repaired
    }
}

/// Result of a dry run, returned to the caller and journaled only.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub domain: String,
    pub result: RepairResult,
}
