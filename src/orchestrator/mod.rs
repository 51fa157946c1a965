//! Repair orchestration.
//!
//! One `evaluate` cycle per domain per trigger:
//!
//! 1. inspect the certificate (outside any lock)
//! 2. store the observation and, if it needs attention, ask the policy
//!    engine; an allowed decision commits the in-flight marker
//! 3. run the repair tool (outside the lock) and verify the result
//! 4. commit the attempt and the success/failure bookkeeping
//!
//! Each step that changes state is a single `DomainStateStore::mutate`, so a
//! crash between steps leaves a consistent record with visible evidence.
//! Panics from collaborators are caught here and become typed outcomes.

mod backoff;
mod bookkeeping;
mod report;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use futures::FutureExt;
use log::{error, info, warn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::DEFAULT_REPAIR_TIMEOUT_SECS;
use crate::domain::normalize_domain;
use crate::error_handling::{
    CycleOutcomeKind, CycleStats, InspectErrorKind, StoreError,
};
use crate::models::{
    Approval, AttemptOutcome, DomainRecord, JournalEntry, Observation, PolicyReason, RenewalMode,
    Severity, TransitionKind,
};
use crate::probe::HttpProbe;
use crate::repair::{RepairExecutor, RepairResult, RepairTool};
use crate::storage::{DomainStateStore, Journal};
use crate::tls::CertificateInspector;

pub use backoff::backoff_for;
pub use report::{CycleReport, DryRunReport};

use bookkeeping::Step;

pub const REASON_INTERNAL_ERROR: &str = "internal_error";

/// Drives observation, policy, and repair for every domain.
pub struct Orchestrator {
    store: Arc<DomainStateStore>,
    inspector: Arc<dyn CertificateInspector>,
    executor: RepairExecutor,
    probe: Option<Arc<dyn HttpProbe>>,
    clock: Arc<dyn Clock>,
    stale_after: ChronoDuration,
    stats: Arc<CycleStats>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<DomainStateStore>,
        inspector: Arc<dyn CertificateInspector>,
        tool: Arc<dyn RepairTool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let executor = RepairExecutor::new(tool, Arc::clone(&inspector), Arc::clone(&clock));
        Orchestrator {
            store,
            inspector,
            executor,
            probe: None,
            clock,
            stale_after: ChronoDuration::seconds(DEFAULT_REPAIR_TIMEOUT_SECS as i64 * 2),
            stats: Arc::new(CycleStats::new()),
        }
    }

    /// Adds an HTTP probe to every inspection.
    pub fn with_probe(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Shares cycle counters with the caller (scheduler, API).
    pub fn with_stats(mut self, stats: Arc<CycleStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Age after which an in-flight marker with no local run is treated as
    /// left behind by a crash.
    pub fn with_stale_repair_after(mut self, after: Duration) -> Self {
        self.stale_after = ChronoDuration::from_std(after).unwrap_or(self.stale_after);
        self
    }

    pub fn stats(&self) -> &Arc<CycleStats> {
        &self.stats
    }

    pub fn store(&self) -> &Arc<DomainStateStore> {
        &self.store
    }

    /// Current record, health re-derived. Does not create a row.
    pub async fn get_state(&self, raw_domain: &str) -> Result<DomainRecord, StoreError> {
        self.store.get(raw_domain).await
    }

    /// Fresh inspection stored as the last observation. Never repairs.
    pub async fn observe(&self, raw_domain: &str) -> Result<DomainRecord, StoreError> {
        let domain = normalize_domain(raw_domain)?;
        let observation = self.inspect(&domain).await;
        let (record, _) = self
            .store
            .mutate(&domain, |record, journal| {
                bookkeeping::store_observation(record, journal, observation.clone())
            })
            .await?;
        Ok(record)
    }

    /// Runs one full cycle synchronously.
    ///
    /// `severity` overrides the one assumed from the observation. Policy
    /// denials and repair failures are `Ok` reports; `Err` means the cycle
    /// could not start or its decision could not be stored.
    pub async fn evaluate(
        &self,
        raw_domain: &str,
        severity: Option<Severity>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, StoreError> {
        let result = self.run_cycle(raw_domain, severity, cancel).await;
        match &result {
            Ok(report) => self.stats.record_outcome(report.outcome),
            Err(StoreError::InvalidDomain(_)) => {}
            Err(StoreError::LockTimeout { .. }) => self.stats.record_outcome(CycleOutcomeKind::Busy),
            Err(e) => {
                warn!("Cycle for {raw_domain} could not record its decision: {e}");
                self.stats.record_outcome(CycleOutcomeKind::Degraded)
            }
        }
        result
    }

    /// `evaluate` bounded by `deadline`.
    ///
    /// Past the deadline `cancel` fires (killing the repair tool) and the
    /// cycle is still awaited, so the killed run is recorded as a failure.
    pub async fn evaluate_with_deadline(
        &self,
        raw_domain: &str,
        severity: Option<Severity>,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<CycleReport, StoreError> {
        let cycle = self.evaluate(raw_domain, severity, &cancel);
        tokio::pin!(cycle);

        tokio::select! {
            result = &mut cycle => result,
            _ = tokio::time::sleep(deadline) => {
                warn!(
                    "Cycle for {raw_domain} exceeded {}s, cancelling",
                    deadline.as_secs()
                );
                cancel.cancel();
                cycle.await
            }
        }
    }

    pub async fn set_renewal_mode(
        &self,
        raw_domain: &str,
        mode: RenewalMode,
    ) -> Result<DomainRecord, StoreError> {
        let (record, changed) = self
            .store
            .mutate(raw_domain, |record, journal| {
                let previous = record.renewal_mode;
                if previous == mode {
                    return false;
                }
                record.renewal_mode = mode;
                journal.record(
                    TransitionKind::ModeChanged,
                    json!({ "from": previous, "to": mode }),
                );
                true
            })
            .await?;
        if changed {
            info!("Renewal mode of {} set to {mode}", record.domain);
        }
        Ok(record)
    }

    /// Grants one assisted repair. A second grant before use replaces the first.
    pub async fn record_assisted_approval(
        &self,
        raw_domain: &str,
    ) -> Result<DomainRecord, StoreError> {
        let (record, _) = self
            .store
            .mutate(raw_domain, |record, journal| {
                let replaced = record.pending_approval.is_some();
                record.pending_approval = Some(Approval {
                    granted_at: journal.now(),
                });
                journal.record(
                    TransitionKind::ApprovalRecorded,
                    json!({ "replaced_pending": replaced }),
                );
            })
            .await?;
        info!("Assisted approval recorded for {}", record.domain);
        Ok(record)
    }

    /// Operator reset of counters, cooldown, escalation, and attempts.
    pub async fn reset_domain(&self, raw_domain: &str) -> Result<DomainRecord, StoreError> {
        let (record, _) = self
            .store
            .mutate(raw_domain, bookkeeping::reset)
            .await?;
        info!("Reset {}", record.domain);
        Ok(record)
    }

    /// Runs the tool with `--dry-run`. Journaled, never counted by policy.
    pub async fn dry_run(
        &self,
        raw_domain: &str,
        cancel: &CancellationToken,
    ) -> Result<DryRunReport, StoreError> {
        let domain = normalize_domain(raw_domain)?;
        let result = match AssertUnwindSafe(self.executor.dry_run(&domain, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => self.internal_failure(&domain, panic),
        };

        self.store
            .mutate(&domain, |_, journal| {
                journal.record(
                    TransitionKind::DryRun,
                    json!({
                        "outcome": result.outcome,
                        "reason": result.reason,
                        "error": result.error,
                    }),
                );
            })
            .await?;
        Ok(DryRunReport { domain, result })
    }

    /// Journal entries for a domain, newest first.
    pub async fn history(
        &self,
        raw_domain: &str,
        limit: Option<u32>,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        self.store.history(raw_domain, limit).await
    }

    pub async fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_domains().await
    }

    /// Converts stale in-flight markers with no local run into failed attempts.
    ///
    /// Meant for process start. A marker younger than the stale threshold may
    /// belong to a repair another process is still running, so it is kept.
    /// Returns how many domains were recovered.
    pub async fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let stale_after = self.stale_after;
        let mut recovered = 0;
        for domain in self.store.list_domains().await? {
            if self.executor.is_in_flight(&domain) {
                continue;
            }
            match self
                .store
                .mutate(&domain, |record, journal| {
                    bookkeeping::interrupt_if_stale(record, journal, stale_after).is_some()
                })
                .await
            {
                Ok((_, true)) => {
                    warn!("Recovered interrupted repair of {domain}");
                    recovered += 1;
                }
                Ok((_, false)) => {}
                Err(e) => error!("Could not recover {domain}: {e}"),
            }
        }
        Ok(recovered)
    }

    async fn run_cycle(
        &self,
        raw_domain: &str,
        severity: Option<Severity>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, StoreError> {
        let domain = normalize_domain(raw_domain)?;
        let observation = self.inspect(&domain).await;

        let stale_after = self.stale_after;
        let executor = &self.executor;
        let (record, (step, severity)) = self
            .store
            .mutate(&domain, |record, journal| {
                let running_locally = executor.is_in_flight(&record.domain);
                bookkeeping::observe_and_decide(
                    record,
                    journal,
                    observation.clone(),
                    severity,
                    stale_after,
                    running_locally,
                )
            })
            .await?;

        let mut report = CycleReport {
            domain: domain.clone(),
            outcome: CycleOutcomeKind::Healthy,
            observation: record.last_observation.clone(),
            severity: Some(severity),
            decision: None,
            attempt: None,
            retry_after: None,
            warning: None,
            record,
        };

        let decision = match step {
            Step::Healthy => return Ok(report),
            Step::Blocked(decision) => {
                info!("Repair of {domain} blocked: {}", decision.reason);
                if decision.reason == PolicyReason::CooldownActive {
                    report.retry_after = report.record.cooldown_until;
                }
                report.outcome = CycleOutcomeKind::Blocked;
                report.decision = Some(decision);
                return Ok(report);
            }
            Step::Rejected(decision, attempt) => {
                info!("Repair of {domain} rejected: another repair is in flight");
                report.outcome = CycleOutcomeKind::RepairRejected;
                report.decision = Some(decision);
                report.attempt = Some(attempt);
                return Ok(report);
            }
            Step::Proceed(decision) => decision,
        };
        report.decision = Some(decision);

        info!("Starting repair of {domain} (severity={severity})");
        let result = match AssertUnwindSafe(self.executor.execute(&domain, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => self.internal_failure(&domain, panic),
        };

        report.outcome = match result.outcome {
            AttemptOutcome::Success => CycleOutcomeKind::Repaired,
            AttemptOutcome::Failure => CycleOutcomeKind::RepairFailed,
            AttemptOutcome::Blocked => CycleOutcomeKind::RepairRejected,
        };

        match self
            .store
            .mutate(&domain, |record, journal| {
                bookkeeping::apply_repair_result(record, journal, &result)
            })
            .await
        {
            Ok((record, attempt)) => {
                report.record = record;
                report.attempt = Some(attempt);
            }
            Err(e) => {
                error!("Repair result for {domain} could not be stored: {e}");
                // Caller still sees what happened; the marker left in the
                // store is recovered as an interrupted attempt later.
                let mut journal = Journal::new(self.clock.now());
                let attempt =
                    bookkeeping::apply_repair_result(&mut report.record, &mut journal, &result);
                report.record.refresh_health();
                report.attempt = Some(attempt);
                report.outcome = CycleOutcomeKind::Degraded;
                report.warning = Some(format!("repair result not persisted: {e}"));
            }
        }

        report.observation = report.record.last_observation.clone();
        if result.outcome == AttemptOutcome::Failure {
            report.retry_after = report.record.cooldown_until;
        }
        match result.outcome {
            AttemptOutcome::Success => info!("Repaired {domain}"),
            _ => warn!(
                "Repair of {domain} ended with {} ({}), {} consecutive failure(s)",
                result.outcome, result.reason, report.record.consecutive_failures
            ),
        }
        Ok(report)
    }

    /// Inspection plus the optional HTTP probe. Always yields an observation.
    async fn inspect(&self, domain: &str) -> Observation {
        let mut observation = match AssertUnwindSafe(self.inspector.inspect(domain))
            .catch_unwind()
            .await
        {
            Ok(observation) => observation,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Inspector panicked for {domain}: {detail}");
                Observation::failed(InspectErrorKind::InternalError, detail, self.clock.now())
            }
        };

        if let Some(probe) = &self.probe {
            observation.http_status = probe.status(domain).await;
        }
        if let Some(kind) = observation.error_kind {
            self.stats.record_inspect_error(kind);
        }
        observation
    }

    fn internal_failure(&self, domain: &str, panic: Box<dyn Any + Send>) -> RepairResult {
        let detail = panic_message(panic.as_ref());
        error!("Repair of {domain} panicked: {detail}");
        RepairResult {
            outcome: AttemptOutcome::Failure,
            reason: REASON_INTERNAL_ERROR.to_string(),
            error: Some(format!("{REASON_INTERNAL_ERROR}: {detail}")),
            output: None,
            verification: None,
            finished_at: self.clock.now(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
