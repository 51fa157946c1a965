// Policy engine tests.

use super::*;
use crate::models::{Approval, AttemptOutcome, RepairAttempt};
use chrono::TimeZone;
use strum::IntoEnumIterator;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 9, 30, 0).unwrap()
}

fn base(mode: RenewalMode) -> DomainRecord {
    let mut record = DomainRecord::new("example.com", now() - ChronoDuration::days(30));
    record.renewal_mode = mode;
    record
}

fn with_attempts(mut record: DomainRecord, hours_ago: &[i64], outcome: AttemptOutcome) -> DomainRecord {
    for hours in hours_ago {
        record.append_attempt(RepairAttempt {
            timestamp: now() - ChronoDuration::hours(*hours),
            outcome,
            reason: "tool_exit_1".into(),
            ..Default::default()
        });
    }
    record
}

/// A record that would trip every later gate at once.
fn hostile(mode: RenewalMode) -> DomainRecord {
    let mut record = with_attempts(base(mode), &[5, 4, 3, 2, 1], AttemptOutcome::Failure);
    record.escalation_level = EscalationLevel::ManualRequired;
    record.consecutive_failures = 5;
    record.cooldown_until = Some(now() + ChronoDuration::hours(6));
    record
}

#[test]
fn test_locked_always_blocks_with_mode_reason() {
    let record = hostile(RenewalMode::Locked);
    for severity in Severity::iter() {
        let decision = evaluate(&record, severity, now());
        assert!(!decision.allowed);
        assert_eq!(decision.reason, PolicyReason::ModeDisallowsRepair);
    }
    let clean = base(RenewalMode::Locked);
    assert_eq!(
        evaluate(&clean, Severity::Critical, now()).reason,
        PolicyReason::ModeDisallowsRepair
    );
}

#[test]
fn test_monitor_only_blocks_with_mode_reason() {
    let decision = evaluate(&base(RenewalMode::MonitorOnly), Severity::Critical, now());
    assert!(!decision.allowed);
    assert_eq!(decision.reason, PolicyReason::ModeDisallowsRepair);
}

#[test]
fn test_manual_escalation_beats_approval_and_rate_limit() {
    let mut record = hostile(RenewalMode::Assisted);
    record.pending_approval = Some(Approval { granted_at: now() });
    let decision = evaluate(&record, Severity::Critical, now());
    assert_eq!(decision.reason, PolicyReason::ManualInterventionRequired);
}

#[test]
fn test_assisted_without_approval_blocks() {
    let decision = evaluate(&base(RenewalMode::Assisted), Severity::Critical, now());
    assert!(!decision.allowed);
    assert_eq!(decision.reason, PolicyReason::AwaitingAssistedApproval);
}

#[test]
fn test_assisted_with_approval_allows_and_marks_consumption() {
    let mut record = base(RenewalMode::Assisted);
    record.pending_approval = Some(Approval { granted_at: now() });
    let decision = evaluate(&record, Severity::Low, now());
    assert!(decision.allowed);
    assert!(decision.uses_approval);
    assert_eq!(decision.reason, PolicyReason::PolicyAllowsRepair);
}

#[test]
fn test_assisted_escalation_requires_approval_in_autonomous_mode() {
    let mut record = base(RenewalMode::Autonomous);
    record.escalation_level = EscalationLevel::AssistedRequired;
    assert_eq!(
        evaluate(&record, Severity::Critical, now()).reason,
        PolicyReason::AwaitingAssistedApproval
    );

    record.pending_approval = Some(Approval { granted_at: now() });
    let decision = evaluate(&record, Severity::Critical, now());
    assert!(decision.allowed);
    assert!(decision.uses_approval);
}

#[test]
fn test_approval_does_not_bypass_rate_limit_or_cooldown() {
    let mut record = with_attempts(
        base(RenewalMode::Assisted),
        &[4, 3, 2, 1],
        AttemptOutcome::Failure,
    );
    record.pending_approval = Some(Approval { granted_at: now() });
    assert_eq!(
        evaluate(&record, Severity::Critical, now()).reason,
        PolicyReason::RateLimitExceeded
    );

    let mut record = base(RenewalMode::Assisted);
    record.pending_approval = Some(Approval { granted_at: now() });
    record.cooldown_until = Some(now() + ChronoDuration::minutes(1));
    assert_eq!(
        evaluate(&record, Severity::Critical, now()).reason,
        PolicyReason::CooldownActive
    );
}

#[test]
fn test_rate_limit_blocks_on_four_attempts_in_24h() {
    let record = with_attempts(
        base(RenewalMode::Autonomous),
        &[20, 10, 5, 1],
        AttemptOutcome::Failure,
    );
    let decision = evaluate(&record, Severity::Critical, now());
    assert!(!decision.allowed);
    assert_eq!(decision.reason, PolicyReason::RateLimitExceeded);
}

#[test]
fn test_three_attempts_in_24h_are_within_limit() {
    let record = with_attempts(
        base(RenewalMode::Autonomous),
        &[20, 10, 5],
        AttemptOutcome::Success,
    );
    assert!(evaluate(&record, Severity::Critical, now()).allowed);
}

#[test]
fn test_rate_limit_ignores_old_and_blocked_attempts() {
    let record = with_attempts(
        base(RenewalMode::Autonomous),
        &[48, 30, 25],
        AttemptOutcome::Failure,
    );
    let record = with_attempts(record, &[3, 2, 1], AttemptOutcome::Blocked);
    let record = with_attempts(record, &[0], AttemptOutcome::Failure);
    assert!(evaluate(&record, Severity::High, now()).allowed);
}

#[test]
fn test_cooldown_blocks_until_expiry() {
    let mut record = base(RenewalMode::Autonomous);
    let until = now() + ChronoDuration::minutes(15);
    record.cooldown_until = Some(until);

    assert_eq!(
        evaluate(&record, Severity::Critical, now()).reason,
        PolicyReason::CooldownActive
    );
    assert_eq!(
        evaluate(&record, Severity::Critical, until - ChronoDuration::seconds(1)).reason,
        PolicyReason::CooldownActive
    );
    assert!(evaluate(&record, Severity::Critical, until).allowed);
}

#[test]
fn test_cooldown_expiry_falls_through_to_later_gates() {
    let mut record = base(RenewalMode::Autonomous);
    record.cooldown_until = Some(now() - ChronoDuration::minutes(1));
    assert_eq!(
        evaluate(&record, Severity::Low, now()).reason,
        PolicyReason::SeverityNotEligible
    );
}

#[test]
fn test_severity_gate_only_in_autonomous_mode() {
    let autonomous = base(RenewalMode::Autonomous);
    for severity in [Severity::Medium, Severity::Low, Severity::Info] {
        assert_eq!(
            evaluate(&autonomous, severity, now()).reason,
            PolicyReason::SeverityNotEligible
        );
    }
    for severity in [Severity::Critical, Severity::High] {
        assert!(evaluate(&autonomous, severity, now()).allowed);
    }

    let mut assisted = base(RenewalMode::Assisted);
    assisted.pending_approval = Some(Approval { granted_at: now() });
    assert!(evaluate(&assisted, Severity::Info, now()).allowed);
}

#[test]
fn test_decision_is_stamped_with_evaluation_time() {
    let decision = evaluate(&base(RenewalMode::Autonomous), Severity::High, now());
    assert_eq!(decision.decided_at, now());
    assert!(!decision.uses_approval);
}

#[test]
fn test_policy_ignores_cached_health_state() {
    let mut record = base(RenewalMode::Autonomous);
    record.health_state = crate::models::HealthState::Escalated;
    assert!(evaluate(&record, Severity::Critical, now()).allowed);
}
