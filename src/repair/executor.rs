//! Repair execution with post-repair verification.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::models::{AttemptOutcome, Observation, RepairAttempt};
use crate::tls::CertificateInspector;

use super::output::{classify_failure, truncate_error};
use super::tool::{RepairTool, RunMode};

pub const REASON_RENEWED: &str = "certificate_renewed";
pub const REASON_DRY_RUN_PASSED: &str = "dry_run_passed";
pub const REASON_ALREADY_IN_FLIGHT: &str = "repair_already_in_flight";
pub const REASON_VERIFICATION_FAILED: &str = "post_repair_verification_failed";

/// Outcome of one `execute` or `dry_run` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairResult {
    pub outcome: AttemptOutcome,
    pub reason: String,
    pub error: Option<String>,
    pub output: Option<String>,
    /// Post-repair inspection, when the tool reported success
    pub verification: Option<Observation>,
    pub finished_at: DateTime<Utc>,
}

impl RepairResult {
    pub fn success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }

    /// Audit trail entry for this result.
    pub fn to_attempt(&self) -> RepairAttempt {
        RepairAttempt {
            timestamp: self.finished_at,
            outcome: self.outcome,
            reason: self.reason.clone(),
            error: self.error.clone(),
            output: self.output.clone(),
        }
    }
}

/// Removes the domain from the in-flight set when the run ends, even on panic.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    domain: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.domain);
    }
}

/// Runs the certificate tool at most once at a time per domain.
pub struct RepairExecutor {
    tool: Arc<dyn RepairTool>,
    inspector: Arc<dyn CertificateInspector>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<String>>,
}

impl RepairExecutor {
    pub fn new(
        tool: Arc<dyn RepairTool>,
        inspector: Arc<dyn CertificateInspector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RepairExecutor {
            tool,
            inspector,
            clock,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a run for `domain` is in progress in this process.
    pub fn is_in_flight(&self, domain: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(domain)
    }

    /// Runs the tool and verifies the installed certificate.
    ///
    /// Never returns an error: tool failures, timeouts, cancellation, and a
    /// failed post-repair check all come back as `AttemptOutcome::Failure`.
    /// A second call for a domain that is already running returns
    /// `AttemptOutcome::Blocked` right away.
    pub async fn execute(&self, domain: &str, cancel: &CancellationToken) -> RepairResult {
        let Some(_guard) = self.try_claim(domain) else {
            return self.rejected(domain);
        };

        let run = match self.tool.run(domain, RunMode::Live, cancel).await {
            Ok(run) => run,
            Err(e) => {
                warn!("Repair of {domain} failed: {e}");
                return self.finish(AttemptOutcome::Failure, e.reason_code(), Some(e.to_string()), None, None);
            }
        };

        if !run.success {
            let reason = classify_failure(&run.output, run.exit_code);
            warn!("Repair tool reported failure for {domain}: {reason}");
            let error = match run.exit_code {
                Some(code) => format!("certificate tool exited with status {code}"),
                None => "certificate tool was terminated by a signal".to_string(),
            };
            return self.finish(AttemptOutcome::Failure, &reason, Some(error), Some(run.output), None);
        }

        // The tool's exit status alone does not prove the new certificate is served
        let verification = self.inspector.inspect(domain).await;
        if verification.passes_post_repair_check() {
            info!(
                "Repair of {domain} verified: {} day(s) remaining",
                verification.days_remaining.unwrap_or_default()
            );
            self.finish(AttemptOutcome::Success, REASON_RENEWED, None, Some(run.output), Some(verification))
        } else {
            let error = format!(
                "certificate still unhealthy after renewal (valid={}, days_remaining={}){}",
                verification.valid,
                verification
                    .days_remaining
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                verification
                    .error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
            warn!("Repair of {domain} not verified: {error}");
            self.finish(
                AttemptOutcome::Failure,
                REASON_VERIFICATION_FAILED,
                Some(error),
                Some(run.output),
                Some(verification),
            )
        }
    }

    /// Runs the tool in dry-run mode. No verification, no state.
    pub async fn dry_run(&self, domain: &str, cancel: &CancellationToken) -> RepairResult {
        let Some(_guard) = self.try_claim(domain) else {
            return self.rejected(domain);
        };

        match self.tool.run(domain, RunMode::DryRun, cancel).await {
            Ok(run) if run.success => {
                self.finish(AttemptOutcome::Success, REASON_DRY_RUN_PASSED, None, Some(run.output), None)
            }
            Ok(run) => {
                let reason = classify_failure(&run.output, run.exit_code);
                self.finish(AttemptOutcome::Failure, &reason, None, Some(run.output), None)
            }
            Err(e) => self.finish(AttemptOutcome::Failure, e.reason_code(), Some(e.to_string()), None, None),
        }
    }

    fn try_claim(&self, domain: &str) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(domain.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            domain: domain.to_string(),
        })
    }

    fn rejected(&self, domain: &str) -> RepairResult {
        info!("Rejected repair of {domain}: another repair is in flight");
        self.finish(
            AttemptOutcome::Blocked,
            REASON_ALREADY_IN_FLIGHT,
            Some(format!("a repair for {domain} is already running")),
            None,
            None,
        )
    }

    fn finish(
        &self,
        outcome: AttemptOutcome,
        reason: &str,
        error: Option<String>,
        output: Option<String>,
        verification: Option<Observation>,
    ) -> RepairResult {
        RepairResult {
            outcome,
            reason: reason.to_string(),
            error: error.map(|e| truncate_error(&e)),
            output: output.filter(|o| !o.is_empty()),
            verification,
            finished_at: self.clock.now(),
        }
    }
}
