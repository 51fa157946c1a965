//! Periodic evaluation of every known domain.
//!
//! Each tick fans out one orchestrator cycle per domain, bounded by a
//! semaphore. Every cycle runs with a hard deadline and a child cancellation
//! token, so a stuck repair is killed and frees its slot instead of holding it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SCHEDULER_JITTER_MAX_MS};
use crate::domain::normalize_domain;
use crate::error_handling::CycleOutcomeKind;
use crate::initialization::init_semaphore;
use crate::orchestrator::Orchestrator;

/// Counts for one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub evaluated: usize,
    pub repaired: usize,
    pub failed: usize,
    /// Cycles that returned an error (busy lock, persistence)
    pub errors: usize,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    seed_domains: Vec<String>,
    max_concurrency: usize,
    tick_interval: Duration,
    cycle_timeout: Duration,
    jitter_max: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        Scheduler {
            orchestrator,
            seed_domains: config.domains.clone(),
            max_concurrency: config.max_concurrency,
            tick_interval: config.tick_interval,
            cycle_timeout: config.cycle_timeout(),
            jitter_max: Duration::from_millis(SCHEDULER_JITTER_MAX_MS),
        }
    }

    /// Disables the start jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_max = Duration::ZERO;
        self
    }

    /// Replaces the per-cycle deadline.
    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Ticks until `cancel` fires. The first pass starts immediately.
    ///
    /// On cancellation, in-flight cycles are cancelled and joined before
    /// this returns.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let summary = self.run_pass(&cancel).await;
                    info!(
                        "Pass finished: {} evaluated, {} repaired, {} failed, {} error(s)",
                        summary.evaluated, summary.repaired, summary.failed, summary.errors
                    );
                }
            }
        }
        info!("Scheduler stopped");
    }

    /// Stored domains plus the configured seed list, normalized and deduplicated.
    pub async fn known_domains(&self) -> BTreeSet<String> {
        let mut domains: BTreeSet<String> = match self.orchestrator.list_domains().await {
            Ok(stored) => stored.into_iter().collect(),
            Err(e) => {
                warn!("Could not list stored domains: {e}");
                BTreeSet::new()
            }
        };
        for raw in &self.seed_domains {
            match normalize_domain(raw) {
                Ok(domain) => {
                    domains.insert(domain);
                }
                Err(e) => warn!("Skipping configured domain '{raw}': {e}"),
            }
        }
        domains
    }

    /// Evaluates every known domain once and waits for all cycles to end.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> PassSummary {
        let domains = self.known_domains().await;
        debug!("Evaluating {} domain(s)", domains.len());

        let semaphore = init_semaphore(self.max_concurrency);
        let mut tasks = FuturesUnordered::new();
        let mut summary = PassSummary::default();

        for domain in domains {
            if cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Semaphore closed, skipping {domain}");
                        continue;
                    }
                },
            };

            let jitter = self.jitter();
            let orchestrator = Arc::clone(&self.orchestrator);
            let cycle_cancel = cancel.child_token();
            let deadline = self.cycle_timeout;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                if !jitter.is_zero() {
                    tokio::select! {
                        _ = cycle_cancel.cancelled() => return None,
                        _ = tokio::time::sleep(jitter) => {}
                    }
                }
                Some(run_with_deadline(&orchestrator, &domain, deadline, cycle_cancel).await)
            }));
        }

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Some(Some(outcome))) => {
                    summary.evaluated += 1;
                    match outcome {
                        CycleOutcomeKind::Repaired => summary.repaired += 1,
                        CycleOutcomeKind::RepairFailed => summary.failed += 1,
                        _ => {}
                    }
                }
                Ok(Some(None)) => {
                    summary.evaluated += 1;
                    summary.errors += 1;
                }
                Ok(None) => {}
                Err(join_error) => {
                    summary.errors += 1;
                    warn!("Cycle task panicked: {join_error:?}");
                }
            }
        }
        summary
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

async fn run_with_deadline(
    orchestrator: &Orchestrator,
    domain: &str,
    deadline: Duration,
    cancel: CancellationToken,
) -> Option<CycleOutcomeKind> {
    match orchestrator
        .evaluate_with_deadline(domain, None, deadline, cancel)
        .await
    {
        Ok(report) => Some(report.outcome),
        Err(e) => {
            warn!("Cycle for {domain} failed: {e}");
            None
        }
    }
}
