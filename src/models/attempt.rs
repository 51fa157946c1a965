//! Repair attempts, policy verdicts, and journaled transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Result class of one repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    #[default]
    Failure,
    /// Rejected before the tool ran (another repair was in flight)
    Blocked,
}

/// One entry of the append-only repair audit trail.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairAttempt {
    pub timestamp: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub reason: String,
    pub error: Option<String>,
    /// Tail of the tool's combined output
    pub output: Option<String>,
}

impl RepairAttempt {
    /// Whether the certificate tool was actually invoked for this entry.
    pub fn invoked_tool(&self) -> bool {
        matches!(
            self.outcome,
            AttemptOutcome::Success | AttemptOutcome::Failure
        )
    }
}

/// Reason codes the policy engine reports, in gate order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyReason {
    #[default]
    ModeDisallowsRepair,
    ManualInterventionRequired,
    AwaitingAssistedApproval,
    RateLimitExceeded,
    CooldownActive,
    SeverityNotEligible,
    PolicyAllowsRepair,
}

/// Verdict of the policy engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: PolicyReason,
    pub decided_at: DateTime<Utc>,
    /// The decision consumed a pending assisted approval
    pub uses_approval: bool,
}

/// A single-use human approval for the next repair attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Approval {
    pub granted_at: DateTime<Utc>,
}

/// Marker committed before the repair tool starts.
///
/// Left behind by a crash, it is turned into a failed attempt on recovery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InFlightRepair {
    pub started_at: DateTime<Utc>,
}

/// Kinds of journaled state transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransitionKind {
    Observed,
    PolicyDecision,
    RepairStarted,
    RepairFinished,
    RepairInterrupted,
    ModeChanged,
    ApprovalRecorded,
    Reset,
    DryRun,
}

/// An immutable journal entry produced alongside a record mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    pub detail: serde_json::Value,
}

impl Transition {
    pub fn new(kind: TransitionKind, at: DateTime<Utc>, detail: impl Serialize) -> Self {
        Transition {
            kind,
            at,
            detail: serde_json::to_value(detail).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A journaled transition as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub domain: String,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    pub detail: serde_json::Value,
}
