// Shared test doubles for orchestrator and store integration tests.
//
// A scripted inspector and repair tool plus a manual clock, so scenarios run
// without network access or a certbot binary.

#![allow(dead_code)] // Not every test file uses every helper

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use cert_steward::error_handling::ToolError;
use cert_steward::{
    CertificateInspector, Clock, DomainStateStore, ManualClock, Observation, Orchestrator,
    RepairTool, RunMode, ToolRun,
};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

/// Returns queued observations in order, then a healthy 90-day certificate.
pub struct StubInspector {
    queue: Mutex<VecDeque<(bool, i64)>>,
    clock: Arc<ManualClock>,
    pub calls: AtomicUsize,
}

impl StubInspector {
    pub fn new(clock: &Arc<ManualClock>) -> Arc<Self> {
        Arc::new(StubInspector {
            queue: Mutex::new(VecDeque::new()),
            clock: Arc::clone(clock),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queues a valid certificate with `days` left.
    pub fn then_days(&self, days: i64) -> &Self {
        self.queue.lock().unwrap().push_back((true, days));
        self
    }

    /// Queues an untrusted certificate with `days` left.
    pub fn then_invalid(&self, days: i64) -> &Self {
        self.queue.lock().unwrap().push_back((false, days));
        self
    }
}

#[async_trait]
impl CertificateInspector for StubInspector {
    async fn inspect(&self, _domain: &str) -> Observation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (valid, days) = self.queue.lock().unwrap().pop_front().unwrap_or((true, 90));
        let now = self.clock.now();
        Observation {
            valid,
            issuer: Some("Let's Encrypt (R11)".into()),
            subject: Some("example.com".into()),
            expires_at: Some(now + chrono::Duration::days(days)),
            days_remaining: Some(days),
            tls_version: Some("TLSv1_3".into()),
            observed_at: now,
            error: (!valid).then(|| "untrusted_issuer: UnknownIssuer".to_string()),
            ..Default::default()
        }
    }
}

/// Exits 0 or 1 as scripted; counts invocations.
pub struct StubTool {
    succeed: Mutex<bool>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub modes: Mutex<Vec<RunMode>>,
}

impl StubTool {
    pub fn succeeding() -> Arc<Self> {
        Self::build(true, Duration::ZERO)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(false, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(true, delay)
    }

    fn build(succeed: bool, delay: Duration) -> Arc<Self> {
        Arc::new(StubTool {
            succeed: Mutex::new(succeed),
            delay,
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_succeed(&self, succeed: bool) {
        *self.succeed.lock().unwrap() = succeed;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepairTool for StubTool {
    async fn run(
        &self,
        _domain: &str,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().unwrap().push(mode);
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        if *self.succeed.lock().unwrap() {
            Ok(ToolRun {
                success: true,
                exit_code: Some(0),
                output: "Successfully received certificate.".into(),
            })
        } else {
            Ok(ToolRun {
                success: false,
                exit_code: Some(1),
                output: "Some challenges have failed.\nurn:ietf:params:acme:error:unauthorized :: Invalid response from http://example.com".into(),
            })
        }
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub inspector: Arc<StubInspector>,
    pub tool: Arc<StubTool>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn in_memory(tool: Arc<StubTool>) -> Self {
        let clock = clock();
        let store = DomainStateStore::in_memory(clock.clone(), Duration::from_secs(2));
        Self::with_store(clock, store, tool)
    }

    pub async fn on_disk(path: &Path, tool: Arc<StubTool>) -> Self {
        let clock = clock();
        let store = DomainStateStore::open(path, clock.clone(), Duration::from_secs(2))
            .await
            .expect("Failed to open state store");
        Self::with_store(clock, store, tool)
    }

    fn with_store(clock: Arc<ManualClock>, store: DomainStateStore, tool: Arc<StubTool>) -> Self {
        let inspector = StubInspector::new(&clock);
        let orchestrator = Orchestrator::new(
            Arc::new(store),
            inspector.clone(),
            tool.clone(),
            clock.clone(),
        );
        Harness {
            clock,
            inspector,
            tool,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
