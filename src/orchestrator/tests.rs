// Orchestrator cycle tests: crash evidence, panics, and degraded writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::*;
use crate::clock::ManualClock;
use crate::error_handling::ToolError;
use crate::models::{EscalationLevel, HealthState, InFlightRepair};
use crate::repair::{RunMode, ToolRun};
use crate::storage::test_helpers::{create_memory_store, create_sqlite_store, test_clock};
use crate::storage::MemoryBackend;

struct QueueInspector {
    queue: Mutex<VecDeque<Observation>>,
    clock: Arc<ManualClock>,
}

#[async_trait]
impl CertificateInspector for QueueInspector {
    async fn inspect(&self, _domain: &str) -> Observation {
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| days_left(&self.clock, 90))
    }
}

struct PanickingInspector;

#[async_trait]
impl CertificateInspector for PanickingInspector {
    async fn inspect(&self, _domain: &str) -> Observation {
        panic!("inspector exploded")
    }
}

enum Behavior {
    Succeed,
    Panic,
    /// Breaks the backend's next commits, then succeeds
    BreakStore(Arc<MemoryBackend>, u32),
}

struct TestTool {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl TestTool {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(TestTool {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RepairTool for TestTool {
    async fn run(
        &self,
        _domain: &str,
        _mode: RunMode,
        _cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::Panic => panic!("tool exploded"),
            Behavior::BreakStore(backend, count) => backend.fail_next_commits(*count),
        }
        Ok(ToolRun {
            success: true,
            exit_code: Some(0),
            output: "ok".into(),
        })
    }
}

fn days_left(clock: &ManualClock, days: i64) -> Observation {
    Observation {
        valid: true,
        days_remaining: Some(days),
        observed_at: clock.now(),
        ..Default::default()
    }
}

fn inspector(clock: &Arc<ManualClock>, days: &[i64]) -> Arc<QueueInspector> {
    Arc::new(QueueInspector {
        queue: Mutex::new(days.iter().map(|d| days_left(clock, *d)).collect()),
        clock: Arc::clone(clock),
    })
}

async fn set_marker(store: &DomainStateStore, domain: &str, started: chrono::DateTime<chrono::Utc>) {
    store
        .mutate(domain, |record, _| {
            record.renewal_mode = RenewalMode::Autonomous;
            record.repair_in_flight = Some(InFlightRepair { started_at: started });
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_marker_is_recovered_before_deciding() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    set_marker(&store, "example.com", clock.now() - ChronoDuration::hours(1)).await;

    let tool = TestTool::new(Behavior::Succeed);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[5, 89]),
        tool.clone(),
        clock.clone(),
    )
    .with_stale_repair_after(Duration::from_secs(600));

    let report = orchestrator
        .evaluate("example.com", None, &CancellationToken::new())
        .await
        .unwrap();

    // Interrupted run counts as a failure, so the fresh cooldown blocks this cycle
    assert_eq!(report.outcome, CycleOutcomeKind::Blocked);
    assert_eq!(
        report.decision.as_ref().map(|d| d.reason),
        Some(PolicyReason::CooldownActive)
    );
    assert_eq!(report.retry_after, report.record.cooldown_until);
    assert_eq!(report.record.consecutive_failures, 1);
    assert_eq!(report.record.repair_attempts.len(), 1);
    assert_eq!(report.record.repair_attempts[0].reason, "repair_interrupted");
    assert!(report.record.repair_in_flight.is_none());
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fresh_marker_rejects_second_repair() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    set_marker(&store, "example.com", clock.now()).await;

    let tool = TestTool::new(Behavior::Succeed);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[5]),
        tool.clone(),
        clock.clone(),
    );

    let report = orchestrator
        .evaluate("example.com", Some(Severity::Critical), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcomeKind::RepairRejected);
    let attempt = report.attempt.unwrap();
    assert_eq!(attempt.outcome, AttemptOutcome::Blocked);
    assert_eq!(attempt.reason, "repair_already_in_flight");
    assert!(report.record.repair_in_flight.is_some());
    assert_eq!(report.record.consecutive_failures, 0);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recover_interrupted_converts_markers() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let long_ago = clock.now() - ChronoDuration::hours(1);
    set_marker(&store, "a.example", long_ago).await;
    set_marker(&store, "b.example", long_ago).await;
    // Possibly another process's repair that is still running
    set_marker(&store, "d.example", clock.now()).await;
    store
        .mutate("c.example", |record, _| record.renewal_mode = RenewalMode::Assisted)
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[]),
        TestTool::new(Behavior::Succeed),
        clock.clone(),
    );
    assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 2);
    assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 0);

    let record = orchestrator.get_state("a.example").await.unwrap();
    assert!(record.repair_in_flight.is_none());
    assert_eq!(record.consecutive_failures, 1);
    assert!(record.cooldown_until.unwrap() > clock.now());
    assert_eq!(record.last_attempt().unwrap().outcome, AttemptOutcome::Failure);

    let history = orchestrator.history("a.example", None).await.unwrap();
    assert_eq!(history[0].kind, TransitionKind::RepairInterrupted);

    let fresh = orchestrator.get_state("d.example").await.unwrap();
    assert!(fresh.repair_in_flight.is_some());
    assert_eq!(fresh.consecutive_failures, 0);
    assert!(fresh.repair_attempts.is_empty());
}

#[tokio::test]
async fn test_inspector_panic_becomes_internal_error_observation() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(PanickingInspector),
        TestTool::new(Behavior::Succeed),
        clock.clone(),
    );

    let report = orchestrator
        .evaluate("example.com", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcomeKind::Blocked);
    let observation = report.observation.unwrap();
    assert!(!observation.valid);
    assert_eq!(observation.error_kind, Some(InspectErrorKind::InternalError));
    assert!(observation
        .error
        .unwrap()
        .starts_with("internal_error: inspector exploded"));
    assert_eq!(
        orchestrator
            .stats()
            .inspect_error_count(InspectErrorKind::InternalError),
        1
    );
}

#[tokio::test]
async fn test_tool_panic_is_recorded_as_failure() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[3]),
        TestTool::new(Behavior::Panic),
        clock.clone(),
    );
    orchestrator
        .set_renewal_mode("example.com", RenewalMode::Autonomous)
        .await
        .unwrap();

    let report = orchestrator
        .evaluate("example.com", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcomeKind::RepairFailed);
    let attempt = report.attempt.unwrap();
    assert_eq!(attempt.reason, REASON_INTERNAL_ERROR);
    assert_eq!(
        attempt.error.as_deref(),
        Some("internal_error: tool exploded")
    );
    let stored = orchestrator.get_state("example.com").await.unwrap();
    assert!(stored.repair_in_flight.is_none());
    assert_eq!(stored.consecutive_failures, 1);
    assert_eq!(stored.health_state, HealthState::RepairFailed);
}

#[tokio::test]
async fn test_unpersisted_result_is_reported_degraded() {
    let clock = test_clock();
    let (store, backend) = create_memory_store(Arc::clone(&clock));
    let store = Arc::new(store);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[3, 89]),
        TestTool::new(Behavior::BreakStore(
            backend.clone(),
            crate::config::STORE_RETRY_MAX_ATTEMPTS as u32 + 1,
        )),
        clock.clone(),
    );
    orchestrator
        .set_renewal_mode("example.com", RenewalMode::Autonomous)
        .await
        .unwrap();

    let report = orchestrator
        .evaluate("example.com", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CycleOutcomeKind::Degraded);
    assert!(report.warning.is_some());
    assert_eq!(report.attempt.unwrap().outcome, AttemptOutcome::Success);

    // Durable state still carries the marker as crash evidence
    let stored = store.get("example.com").await.unwrap();
    assert!(stored.repair_in_flight.is_some());
    assert!(stored.repair_attempts.is_empty());
    assert_eq!(
        orchestrator.stats().outcome_count(CycleOutcomeKind::Degraded),
        1
    );
}

#[tokio::test]
async fn test_lock_timeout_counts_as_busy() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[5]),
        TestTool::new(Behavior::Succeed),
        clock.clone(),
    );

    let _held = store.lock_domain("example.com").await.unwrap();
    let result = orchestrator
        .evaluate("example.com", None, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    assert_eq!(orchestrator.stats().outcome_count(CycleOutcomeKind::Busy), 1);
}

#[tokio::test]
async fn test_dry_run_is_journaled_not_counted() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let tool = TestTool::new(Behavior::Succeed);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[]),
        tool.clone(),
        clock.clone(),
    );

    let report = orchestrator
        .dry_run("Example.COM.", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.domain, "example.com");
    assert!(report.result.success());

    let record = orchestrator.get_state("example.com").await.unwrap();
    assert!(record.repair_attempts.is_empty());
    let history = orchestrator.history("example.com", None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, TransitionKind::DryRun);
    assert_eq!(history[0].detail["reason"], "dry_run_passed");
}

#[tokio::test]
async fn test_mode_change_is_journaled_once() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[]),
        TestTool::new(Behavior::Succeed),
        clock.clone(),
    );

    orchestrator
        .set_renewal_mode("example.com", RenewalMode::Locked)
        .await
        .unwrap();
    orchestrator
        .set_renewal_mode("example.com", RenewalMode::Locked)
        .await
        .unwrap();

    let history = orchestrator.history("example.com", None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, TransitionKind::ModeChanged);
    assert_eq!(history[0].detail["from"], "monitor_only");
    assert_eq!(history[0].detail["to"], "locked");
}

#[tokio::test]
async fn test_reset_archives_cleared_attempts() {
    let clock = test_clock();
    let store = Arc::new(create_sqlite_store(Arc::clone(&clock)).await);
    set_marker(&store, "example.com", clock.now() - ChronoDuration::hours(1)).await;
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        inspector(&clock, &[]),
        TestTool::new(Behavior::Succeed),
        clock.clone(),
    );
    assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 1);
    store
        .mutate("example.com", |record, _| {
            record.escalation_level = EscalationLevel::ManualRequired
        })
        .await
        .unwrap();

    let record = orchestrator.reset_domain("example.com").await.unwrap();

    assert_eq!(record.escalation_level, EscalationLevel::None);
    assert_eq!(record.consecutive_failures, 0);
    assert!(record.cooldown_until.is_none());
    assert!(record.repair_attempts.is_empty());
    assert_eq!(record.renewal_mode, RenewalMode::Autonomous);

    let history = orchestrator.history("example.com", Some(1)).await.unwrap();
    assert_eq!(history[0].kind, TransitionKind::Reset);
    assert_eq!(
        history[0].detail["cleared_attempts"].as_array().map(Vec::len),
        Some(1)
    );
}
