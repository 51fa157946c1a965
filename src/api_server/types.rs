//! API state and request/response bodies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error_handling::CycleStatsSnapshot;
use crate::models::{RenewalMode, Severity};
use crate::orchestrator::Orchestrator;

/// Shared state for the API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// Deadline for evaluate and dry-run requests
    pub cycle_timeout: Duration,
    /// Parent of every request's cancellation token
    pub shutdown: CancellationToken,
    pub start_time: Arc<Instant>,
}

impl ApiState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        cycle_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        ApiState {
            orchestrator,
            cycle_timeout,
            shutdown,
            start_time: Arc::new(Instant::now()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: RenewalMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvaluateParams {
    pub severity: Option<Severity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// JSON response for `/status`
#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: f64,
    /// Writes suspended by the state store circuit breaker
    pub store_degraded: bool,
    pub cycles: CycleStatsSnapshot,
}
