//! JSON status handler.

use axum::extract::State;
use axum::Json;

use super::super::types::{ApiState, StatusResponse};

/// Cycle counters since process start
pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        uptime_seconds: state.start_time.elapsed().as_secs_f64(),
        store_degraded: state.orchestrator.store().is_degraded(),
        cycles: state.orchestrator.stats().snapshot(),
    })
}
