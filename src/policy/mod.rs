//! Repair policy engine.
//!
//! `evaluate()` is a pure function of the record, the severity of the issue,
//! and the current time. Gates run in a fixed order and the first block wins:
//!
//! 1. renewal mode (`mode_disallows_repair`)
//! 2. manual escalation (`manual_intervention_required`)
//! 3. assisted approval (`awaiting_assisted_approval`)
//! 4. 24h attempt rate limit (`rate_limit_exceeded`)
//! 5. failure cooldown (`cooldown_active`)
//! 6. severity, autonomous mode only (`severity_not_eligible`)
//!
//! Safety gates come before cost gates, which come before the severity
//! heuristic. Every input is re-derived from counters and timestamps; the
//! cached health state is never consulted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::{RATE_LIMIT_MAX_ATTEMPTS, RATE_LIMIT_WINDOW};
use crate::models::{
    DomainRecord, EscalationLevel, PolicyDecision, PolicyReason, RenewalMode, Severity,
};

/// Decides whether a repair may start now.
pub fn evaluate(record: &DomainRecord, severity: Severity, now: DateTime<Utc>) -> PolicyDecision {
    let blocked = |reason| PolicyDecision {
        allowed: false,
        reason,
        decided_at: now,
        uses_approval: false,
    };

    if !record.renewal_mode.allows_repair() {
        return blocked(PolicyReason::ModeDisallowsRepair);
    }

    if record.escalation_level == EscalationLevel::ManualRequired {
        return blocked(PolicyReason::ManualInterventionRequired);
    }

    let needs_approval = requires_approval(record);
    if needs_approval && record.pending_approval.is_none() {
        return blocked(PolicyReason::AwaitingAssistedApproval);
    }

    if attempts_in_window(record, now) > RATE_LIMIT_MAX_ATTEMPTS {
        return blocked(PolicyReason::RateLimitExceeded);
    }

    if record.cooldown_until.is_some_and(|until| now < until) {
        return blocked(PolicyReason::CooldownActive);
    }

    if record.renewal_mode == RenewalMode::Autonomous && !severity.is_autonomous_eligible() {
        return blocked(PolicyReason::SeverityNotEligible);
    }

    PolicyDecision {
        allowed: true,
        reason: PolicyReason::PolicyAllowsRepair,
        decided_at: now,
        uses_approval: needs_approval,
    }
}

/// Assisted mode, or an autonomous domain downgraded by escalation.
pub fn requires_approval(record: &DomainRecord) -> bool {
    record.renewal_mode == RenewalMode::Assisted
        || record.escalation_level == EscalationLevel::AssistedRequired
}

/// Tool invocations inside the trailing rate-limit window.
pub fn attempts_in_window(record: &DomainRecord, now: DateTime<Utc>) -> usize {
    let window = ChronoDuration::from_std(RATE_LIMIT_WINDOW).unwrap_or(ChronoDuration::days(1));
    record.tool_attempts_since(now - window)
}
