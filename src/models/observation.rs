//! Point-in-time inspection results and issue severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::{EXPIRING_SOON_DAYS, POST_REPAIR_MIN_DAYS};
use crate::error_handling::InspectErrorKind;

/// A single TLS inspection of a domain.
///
/// Always terminal: failures are carried in `error`/`error_kind` with
/// `valid = false`, never raised. `days_remaining` is negative once the
/// certificate has expired.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    pub valid: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub tls_version: Option<String>,
    /// Status code from the HTTP probe, when probing is enabled
    pub http_status: Option<u16>,
    pub observed_at: DateTime<Utc>,
    pub error: Option<String>,
    pub error_kind: Option<InspectErrorKind>,
}

impl Observation {
    /// Builds a failed observation carrying its classified reason.
    pub fn failed(kind: InspectErrorKind, detail: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        let detail = detail.into();
        let error = if detail.is_empty() {
            kind.as_str().to_string()
        } else {
            format!("{}: {}", kind.as_str(), detail)
        };
        Observation {
            valid: false,
            observed_at,
            error: Some(error),
            error_kind: Some(kind),
            ..Default::default()
        }
    }

    /// Invalid, or valid with `EXPIRING_SOON_DAYS` or fewer days left.
    pub fn needs_attention(&self) -> bool {
        !self.valid
            || self
                .days_remaining
                .map(|days| days <= EXPIRING_SOON_DAYS)
                .unwrap_or(true)
    }

    /// Acceptable state right after a repair.
    pub fn passes_post_repair_check(&self) -> bool {
        self.valid
            && self
                .days_remaining
                .map(|days| days > POST_REPAIR_MIN_DAYS)
                .unwrap_or(false)
    }
}

/// How urgent a certificate problem is.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Severities autonomous mode will act on without a human.
    pub fn is_autonomous_eligible(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    /// Severity assumed when the caller does not supply one.
    ///
    /// Anything that needs attention is `Critical`, so scheduled cycles repair
    /// every expiring or invalid certificate that policy otherwise allows.
    pub fn assumed_for(observation: &Observation) -> Self {
        if observation.needs_attention() {
            Severity::Critical
        } else {
            Severity::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn valid_with_days(days: i64) -> Observation {
        Observation {
            valid: true,
            days_remaining: Some(days),
            observed_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_needs_attention_thresholds() {
        assert!(!valid_with_days(90).needs_attention());
        assert!(!valid_with_days(16).needs_attention());
        assert!(valid_with_days(15).needs_attention());
        assert!(valid_with_days(0).needs_attention());
        assert!(valid_with_days(-3).needs_attention());
    }

    #[test]
    fn test_invalid_observation_needs_attention() {
        let obs = Observation::failed(InspectErrorKind::ConnectTimeout, "5s", Utc::now());
        assert!(obs.needs_attention());
        assert_eq!(obs.error.as_deref(), Some("connect_timeout: 5s"));
        assert_eq!(obs.error_kind, Some(InspectErrorKind::ConnectTimeout));
    }

    #[test]
    fn test_post_repair_check() {
        assert!(valid_with_days(89).passes_post_repair_check());
        assert!(valid_with_days(11).passes_post_repair_check());
        assert!(!valid_with_days(10).passes_post_repair_check());
        assert!(!valid_with_days(2).passes_post_repair_check());
        let mut invalid = valid_with_days(80);
        invalid.valid = false;
        assert!(!invalid.passes_post_repair_check());
    }

    #[test]
    fn test_assumed_severity() {
        for days in [-1, 5, 10, 15] {
            assert_eq!(
                Severity::assumed_for(&valid_with_days(days)),
                Severity::Critical,
                "{days} days left"
            );
        }
        assert_eq!(Severity::assumed_for(&valid_with_days(16)), Severity::Info);
        assert_eq!(Severity::assumed_for(&valid_with_days(60)), Severity::Info);
        let failed = Observation::failed(InspectErrorKind::HostnameMismatch, "", Utc::now());
        assert_eq!(Severity::assumed_for(&failed), Severity::Critical);
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!(Severity::from_str("critical").unwrap(), Severity::Critical);
        assert_eq!(Severity::from_str("HIGH").unwrap(), Severity::High);
        assert!(Severity::from_str("urgent").is_err());
        assert_eq!(Severity::Medium.to_string(), "medium");
    }

    #[test]
    fn test_observation_tolerates_missing_fields() {
        let obs: Observation =
            serde_json::from_str(r#"{"valid": true, "days_remaining": 30, "future": 1}"#)
                .unwrap();
        assert!(obs.valid);
        assert_eq!(obs.days_remaining, Some(30));
        assert!(obs.issuer.is_none());
    }
}
