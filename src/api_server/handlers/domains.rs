//! Per-domain handlers.
//!
//! Cycles run in their own task: a client disconnecting mid-repair must not
//! drop the cycle between its marker commit and its result commit.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;

use crate::models::{DomainRecord, JournalEntry};
use crate::orchestrator::{CycleReport, DryRunReport};

use super::super::error::ApiError;
use super::super::types::{ApiState, EvaluateParams, HistoryParams, ModeRequest};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn get_state(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> ApiResult<DomainRecord> {
    Ok(Json(state.orchestrator.get_state(&domain).await?))
}

pub async fn observe(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> ApiResult<DomainRecord> {
    Ok(Json(state.orchestrator.observe(&domain).await?))
}

pub async fn evaluate(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
    params: Result<Query<EvaluateParams>, QueryRejection>,
) -> ApiResult<CycleReport> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let orchestrator = Arc::clone(&state.orchestrator);
    let cancel = state.shutdown.child_token();
    let deadline = state.cycle_timeout;

    let report = tokio::spawn(async move {
        orchestrator
            .evaluate_with_deadline(&domain, params.severity, deadline, cancel)
            .await
    })
    .await
    .map_err(|e| ApiError::Internal(format!("evaluation task failed: {e}")))??;
    Ok(Json(report))
}

pub async fn set_mode(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> ApiResult<DomainRecord> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(
        state
            .orchestrator
            .set_renewal_mode(&domain, request.mode)
            .await?,
    ))
}

pub async fn approve(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> ApiResult<DomainRecord> {
    Ok(Json(
        state.orchestrator.record_assisted_approval(&domain).await?,
    ))
}

pub async fn reset(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> ApiResult<DomainRecord> {
    Ok(Json(state.orchestrator.reset_domain(&domain).await?))
}

pub async fn dry_run(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> ApiResult<DryRunReport> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let cancel = state.shutdown.child_token();

    let report = tokio::spawn(async move { orchestrator.dry_run(&domain, &cancel).await })
        .await
        .map_err(|e| ApiError::Internal(format!("dry run task failed: {e}")))??;
    Ok(Json(report))
}

pub async fn history(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Vec<JournalEntry>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.orchestrator.history(&domain, params.limit).await?))
}
