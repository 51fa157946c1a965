//! Record transitions applied inside store mutations.
//!
//! Pure functions over a `DomainRecord` and the mutation's `Journal`; the
//! orchestrator decides when to call them, the store makes them durable.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;

use crate::config::{ASSISTED_ESCALATION_FAILURES, MANUAL_ESCALATION_FAILURES};
use crate::models::{
    AttemptOutcome, DomainRecord, EscalationLevel, InFlightRepair, Observation, PolicyDecision,
    RepairAttempt, Severity, TransitionKind,
};
use crate::policy;
use crate::repair::{RepairResult, REASON_ALREADY_IN_FLIGHT};
use crate::storage::Journal;

pub(crate) const REASON_INTERRUPTED: &str = "repair_interrupted";

/// What a cycle does after its decision has been committed.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Certificate healthy, no decision taken
    Healthy,
    /// Policy denied the repair
    Blocked(PolicyDecision),
    /// Policy allowed it but another repair holds the domain
    Rejected(PolicyDecision, RepairAttempt),
    /// In-flight marker committed, run the tool
    Proceed(PolicyDecision),
}

/// Stores the observation and, if the certificate needs attention, decides.
///
/// A leftover in-flight marker older than `stale_after`, with no run for the
/// domain in this process, is converted into an interrupted attempt first.
pub(crate) fn observe_and_decide(
    record: &mut DomainRecord,
    journal: &mut Journal,
    observation: Observation,
    severity: Option<Severity>,
    stale_after: ChronoDuration,
    running_locally: bool,
) -> (Step, Severity) {
    let now = journal.now();
    if !running_locally {
        interrupt_if_stale(record, journal, stale_after);
    }

    store_observation(record, journal, observation);
    let Some(observation) = record.last_observation.as_ref() else {
        return (Step::Healthy, Severity::Info);
    };
    let severity = severity.unwrap_or_else(|| Severity::assumed_for(observation));
    if !observation.needs_attention() {
        return (Step::Healthy, severity);
    }

    let decision = policy::evaluate(record, severity, now);
    record.last_policy_decision = Some(decision.clone());
    journal.record(
        TransitionKind::PolicyDecision,
        json!({
            "allowed": decision.allowed,
            "reason": decision.reason,
            "severity": severity,
        }),
    );

    if !decision.allowed {
        return (Step::Blocked(decision), severity);
    }

    if let Some(marker) = &record.repair_in_flight {
        let attempt = RepairAttempt {
            timestamp: now,
            outcome: AttemptOutcome::Blocked,
            reason: REASON_ALREADY_IN_FLIGHT.to_string(),
            error: Some(format!(
                "a repair started at {} has not finished",
                marker.started_at.to_rfc3339()
            )),
            output: None,
        };
        record.append_attempt(attempt.clone());
        return (Step::Rejected(decision, attempt), severity);
    }

    if decision.uses_approval {
        record.pending_approval = None;
    }
    record.repair_in_flight = Some(InFlightRepair { started_at: now });
    journal.record(
        TransitionKind::RepairStarted,
        json!({ "severity": severity, "uses_approval": decision.uses_approval }),
    );
    (Step::Proceed(decision), severity)
}

/// Replaces the last observation and journals a summary of it.
pub(crate) fn store_observation(
    record: &mut DomainRecord,
    journal: &mut Journal,
    observation: Observation,
) {
    journal.record(
        TransitionKind::Observed,
        json!({
            "valid": observation.valid,
            "days_remaining": observation.days_remaining,
            "error_kind": observation.error_kind,
        }),
    );
    record.last_observation = Some(observation);
}

/// Clears the in-flight marker and records how the repair ended.
///
/// A `Blocked` result means another run owns the domain, so its marker stays.
pub(crate) fn apply_repair_result(
    record: &mut DomainRecord,
    journal: &mut Journal,
    result: &RepairResult,
) -> RepairAttempt {
    if result.outcome != AttemptOutcome::Blocked {
        record.repair_in_flight = None;
    }
    if let Some(verification) = &result.verification {
        record.last_observation = Some(verification.clone());
    }

    let mut attempt = result.to_attempt();
    attempt.timestamp = record.append_attempt(attempt.clone());

    let raised = match result.outcome {
        AttemptOutcome::Success => {
            record_success(record);
            None
        }
        AttemptOutcome::Failure => record_failure(record, attempt.timestamp),
        AttemptOutcome::Blocked => None,
    };

    journal.record(
        TransitionKind::RepairFinished,
        json!({
            "outcome": attempt.outcome,
            "reason": attempt.reason,
            "consecutive_failures": record.consecutive_failures,
            "cooldown_until": record.cooldown_until,
            "escalated_to": raised,
        }),
    );
    attempt
}

/// `interrupt` for a marker at least `stale_after` old.
///
/// A younger marker may belong to a repair running in another process.
pub(crate) fn interrupt_if_stale(
    record: &mut DomainRecord,
    journal: &mut Journal,
    stale_after: ChronoDuration,
) -> Option<RepairAttempt> {
    let now = journal.now();
    let stale = record
        .repair_in_flight
        .as_ref()
        .is_some_and(|marker| marker.started_at + stale_after <= now);
    if stale {
        interrupt(record, journal)
    } else {
        None
    }
}

/// Turns an in-flight marker into a failed attempt.
pub(crate) fn interrupt(record: &mut DomainRecord, journal: &mut Journal) -> Option<RepairAttempt> {
    let marker = record.repair_in_flight.take()?;
    let now = journal.now();
    let attempt = RepairAttempt {
        timestamp: now,
        outcome: AttemptOutcome::Failure,
        reason: REASON_INTERRUPTED.to_string(),
        error: Some(format!(
            "repair started at {} never reported a result",
            marker.started_at.to_rfc3339()
        )),
        output: None,
    };
    record.append_attempt(attempt.clone());
    let raised = record_failure(record, now);
    journal.record(
        TransitionKind::RepairInterrupted,
        json!({
            "started_at": marker.started_at,
            "consecutive_failures": record.consecutive_failures,
            "escalated_to": raised,
        }),
    );
    Some(attempt)
}

/// Success resets the failure counter and cooldown; escalation is kept.
pub(crate) fn record_success(record: &mut DomainRecord) {
    record.consecutive_failures = 0;
    record.cooldown_until = None;
}

/// Counts a failure, schedules the cooldown, and escalates at the thresholds.
///
/// Returns the new escalation level if it was raised.
pub(crate) fn record_failure(
    record: &mut DomainRecord,
    now: DateTime<Utc>,
) -> Option<EscalationLevel> {
    record.consecutive_failures = record.consecutive_failures.saturating_add(1);
    let delay = super::backoff::backoff_for(record.consecutive_failures);
    record.cooldown_until =
        Some(now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::days(1)));

    let target = if record.consecutive_failures >= MANUAL_ESCALATION_FAILURES {
        EscalationLevel::ManualRequired
    } else if record.consecutive_failures >= ASSISTED_ESCALATION_FAILURES {
        EscalationLevel::AssistedRequired
    } else {
        EscalationLevel::None
    };
    record.escalate_to(target).then_some(target)
}

/// Operator reset: counters, cooldown, escalation, approval, and attempts.
///
/// The cleared attempts are archived in the reset journal entry. Identity,
/// renewal mode, and the last observation survive.
pub(crate) fn reset(record: &mut DomainRecord, journal: &mut Journal) {
    let cleared = std::mem::take(&mut record.repair_attempts);
    journal.record(
        TransitionKind::Reset,
        json!({
            "previous_escalation": record.escalation_level,
            "previous_consecutive_failures": record.consecutive_failures,
            "cleared_attempts": cleared,
        }),
    );
    record.consecutive_failures = 0;
    record.cooldown_until = None;
    record.escalation_level = EscalationLevel::None;
    record.pending_approval = None;
    record.last_policy_decision = None;
}
