//! Circuit breaker for state store commits.
//!
//! After N consecutive commits fail (each already retried), the circuit opens
//! and mutations fail fast with `StoreError::CircuitOpen` until a cooldown
//! expires. The first commit after the cooldown is a trial: success closes
//! the circuit, failure reopens it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::{STORE_CIRCUIT_COOLDOWN_SECS, STORE_CIRCUIT_FAILURE_THRESHOLD};

/// Write circuit shared by every mutation of one store.
pub struct StoreWriteCircuitBreaker {
    /// Number of consecutive failures before opening circuit
    failure_threshold: u32,
    /// Cooldown period before attempting to close circuit again
    cooldown_duration: Duration,
    /// Current consecutive failure count
    failure_count: AtomicU32,
    /// Whether the circuit is currently open
    is_open: AtomicBool,
    /// When the circuit was last opened
    opened_at: RwLock<Option<Instant>>,
}

impl StoreWriteCircuitBreaker {
    /// Circuit with the configured threshold and cooldown.
    pub fn new() -> Self {
        Self::with_threshold(
            STORE_CIRCUIT_FAILURE_THRESHOLD,
            Duration::from_secs(STORE_CIRCUIT_COOLDOWN_SECS),
        )
    }

    pub fn with_threshold(failure_threshold: u32, cooldown_duration: Duration) -> Self {
        StoreWriteCircuitBreaker {
            failure_threshold,
            cooldown_duration,
            failure_count: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    /// Resets the failure count and closes the circuit if it was open.
    pub async fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        if self.is_open.swap(false, Ordering::SeqCst) {
            *self.opened_at.write().await = None;
            log::info!("State store circuit closed after a successful commit");
        }
    }

    /// Counts a failed commit and opens the circuit at the threshold.
    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;

        if count < self.failure_threshold {
            return;
        }
        let was_open = self.is_open.swap(true, Ordering::SeqCst);
        *self.opened_at.write().await = Some(Instant::now());
        if !was_open {
            log::error!(
                "State store circuit opened after {} consecutive failed commits; running degraded for {}s",
                count,
                self.cooldown_duration.as_secs()
            );
        }
    }

    /// Whether commits are currently suspended.
    ///
    /// Once the cooldown has expired this returns `false` so one trial commit
    /// can go through.
    pub async fn is_circuit_open(&self) -> bool {
        if !self.is_open.load(Ordering::SeqCst) {
            return false;
        }

        let opened_at = self.opened_at.read().await;
        match *opened_at {
            Some(opened) if opened.elapsed() < self.cooldown_duration => true,
            _ => {
                log::info!("State store circuit cooldown expired, allowing a trial commit");
                false
            }
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

impl Default for StoreWriteCircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
