//! The per-domain record and its derived health state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::attempt::{Approval, InFlightRepair, PolicyDecision, RepairAttempt};
use super::observation::Observation;

/// Operator-set automation level for a domain.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RenewalMode {
    /// Observe only; never repair
    #[default]
    MonitorOnly,
    /// Repair only after a recorded human approval
    Assisted,
    /// Repair high-severity issues without a human
    Autonomous,
    /// Frozen by an operator; never repair
    Locked,
}

impl RenewalMode {
    pub fn allows_repair(&self) -> bool {
        matches!(self, RenewalMode::Assisted | RenewalMode::Autonomous)
    }
}

/// Trust downgrade after repeated failures. Ordered: it only moves up.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EscalationLevel {
    #[default]
    None,
    AssistedRequired,
    ManualRequired,
}

/// Cached classification of a domain, recomputed from the record on read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthState {
    /// No observation has been stored yet
    #[default]
    Unobserved,
    Ok,
    ExpiringSoon,
    Invalid,
    RepairInProgress,
    RepairFailed,
    Escalated,
}

/// Canonical state of one domain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRecord {
    /// Normalized hostname, primary key
    pub domain: String,
    pub renewal_mode: RenewalMode,
    pub last_observation: Option<Observation>,
    pub health_state: HealthState,
    /// Append-only audit trail, strictly increasing timestamps
    pub repair_attempts: Vec<RepairAttempt>,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub escalation_level: EscalationLevel,
    pub last_policy_decision: Option<PolicyDecision>,
    pub pending_approval: Option<Approval>,
    pub repair_in_flight: Option<InFlightRepair>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainRecord {
    /// Fresh record: monitor-only, no history.
    pub fn new(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        DomainRecord {
            domain: domain.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Derives the health state from observation, counters, and markers.
    pub fn derive_health(&self) -> HealthState {
        if self.repair_in_flight.is_some() {
            return HealthState::RepairInProgress;
        }
        if self.escalation_level == EscalationLevel::ManualRequired {
            return HealthState::Escalated;
        }
        let Some(observation) = &self.last_observation else {
            return HealthState::Unobserved;
        };
        if observation.needs_attention() && self.consecutive_failures > 0 {
            return HealthState::RepairFailed;
        }
        if !observation.valid {
            return HealthState::Invalid;
        }
        if observation.needs_attention() {
            return HealthState::ExpiringSoon;
        }
        HealthState::Ok
    }

    pub fn refresh_health(&mut self) {
        self.health_state = self.derive_health();
    }

    /// Appends to the audit trail, keeping timestamps strictly increasing.
    ///
    /// Returns the timestamp actually stored.
    pub fn append_attempt(&mut self, mut attempt: RepairAttempt) -> DateTime<Utc> {
        if let Some(last) = self.repair_attempts.last() {
            if attempt.timestamp <= last.timestamp {
                attempt.timestamp = last.timestamp + ChronoDuration::milliseconds(1);
            }
        }
        let stored_at = attempt.timestamp;
        self.repair_attempts.push(attempt);
        stored_at
    }

    pub fn last_attempt(&self) -> Option<&RepairAttempt> {
        self.repair_attempts.last()
    }

    /// Tool invocations recorded after `cutoff`.
    pub fn tool_attempts_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.repair_attempts
            .iter()
            .rev()
            .take_while(|attempt| attempt.timestamp > cutoff)
            .filter(|attempt| attempt.invoked_tool())
            .count()
    }

    /// Raises the escalation level; never lowers it.
    pub fn escalate_to(&mut self, level: EscalationLevel) -> bool {
        if level > self.escalation_level {
            self.escalation_level = level;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttemptOutcome;

    fn observation(valid: bool, days: i64) -> Observation {
        Observation {
            valid,
            days_remaining: Some(days),
            observed_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = DomainRecord::new("example.com", Utc::now());
        assert_eq!(record.renewal_mode, RenewalMode::MonitorOnly);
        assert_eq!(record.escalation_level, EscalationLevel::None);
        assert_eq!(record.derive_health(), HealthState::Unobserved);
        assert!(record.repair_attempts.is_empty());
    }

    #[test]
    fn test_health_derivation_order() {
        let mut record = DomainRecord::new("example.com", Utc::now());
        record.last_observation = Some(observation(true, 90));
        assert_eq!(record.derive_health(), HealthState::Ok);

        record.last_observation = Some(observation(true, 12));
        assert_eq!(record.derive_health(), HealthState::ExpiringSoon);

        record.last_observation = Some(observation(false, -2));
        assert_eq!(record.derive_health(), HealthState::Invalid);

        record.consecutive_failures = 1;
        assert_eq!(record.derive_health(), HealthState::RepairFailed);

        record.escalation_level = EscalationLevel::ManualRequired;
        assert_eq!(record.derive_health(), HealthState::Escalated);

        record.repair_in_flight = Some(InFlightRepair {
            started_at: Utc::now(),
        });
        assert_eq!(record.derive_health(), HealthState::RepairInProgress);
    }

    #[test]
    fn test_escalated_record_with_valid_certificate_stays_escalated() {
        let mut record = DomainRecord::new("example.com", Utc::now());
        record.escalation_level = EscalationLevel::ManualRequired;
        record.last_observation = Some(observation(true, 80));
        assert_eq!(record.derive_health(), HealthState::Escalated);
    }

    #[test]
    fn test_append_attempt_enforces_increasing_timestamps() {
        let now = Utc::now();
        let mut record = DomainRecord::new("example.com", now);
        record.append_attempt(RepairAttempt {
            timestamp: now,
            outcome: AttemptOutcome::Failure,
            ..Default::default()
        });
        let second = record.append_attempt(RepairAttempt {
            timestamp: now,
            outcome: AttemptOutcome::Failure,
            ..Default::default()
        });
        let third = record.append_attempt(RepairAttempt {
            timestamp: now - ChronoDuration::hours(1),
            outcome: AttemptOutcome::Success,
            ..Default::default()
        });
        assert!(second > now);
        assert!(third > second);
        assert_eq!(record.repair_attempts.len(), 3);
    }

    #[test]
    fn test_tool_attempts_since_ignores_blocked_and_old() {
        let now = Utc::now();
        let mut record = DomainRecord::new("example.com", now);
        for (hours_ago, outcome) in [
            (30, AttemptOutcome::Failure),
            (5, AttemptOutcome::Failure),
            (4, AttemptOutcome::Blocked),
            (3, AttemptOutcome::Success),
        ] {
            record.append_attempt(RepairAttempt {
                timestamp: now - ChronoDuration::hours(hours_ago),
                outcome,
                ..Default::default()
            });
        }
        assert_eq!(record.tool_attempts_since(now - ChronoDuration::hours(24)), 2);
    }

    #[test]
    fn test_escalation_only_increases() {
        let mut record = DomainRecord::new("example.com", Utc::now());
        assert!(record.escalate_to(EscalationLevel::AssistedRequired));
        assert!(record.escalate_to(EscalationLevel::ManualRequired));
        assert!(!record.escalate_to(EscalationLevel::AssistedRequired));
        assert_eq!(record.escalation_level, EscalationLevel::ManualRequired);
    }

    #[test]
    fn test_record_deserializes_with_unknown_and_missing_fields() {
        let json = r#"{
            "domain": "example.com",
            "renewal_mode": "autonomous",
            "consecutive_failures": 2,
            "some_future_field": {"nested": true}
        }"#;
        let record: DomainRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.domain, "example.com");
        assert_eq!(record.renewal_mode, RenewalMode::Autonomous);
        assert_eq!(record.consecutive_failures, 2);
        assert!(record.repair_attempts.is_empty());
        assert_eq!(record.escalation_level, EscalationLevel::None);
    }

    #[test]
    fn test_renewal_mode_parsing() {
        use std::str::FromStr;
        assert_eq!(
            RenewalMode::from_str("monitor_only").unwrap(),
            RenewalMode::MonitorOnly
        );
        assert_eq!(
            RenewalMode::from_str("Autonomous").unwrap(),
            RenewalMode::Autonomous
        );
        assert!(RenewalMode::from_str("auto").is_err());
        assert!(!RenewalMode::Locked.allows_repair());
        assert!(RenewalMode::Assisted.allows_repair());
    }
}
