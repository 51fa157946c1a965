//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error_handling::StoreError;

/// Error body: `{"error": "<message>", "code": "<reason code>"}`.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    /// Malformed body or query string
    BadRequest(String),
    /// The request's task died before producing a result
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Store(StoreError::InvalidDomain(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_domain")
            }
            ApiError::Store(StoreError::LockTimeout { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "domain_busy")
            }
            ApiError::Store(StoreError::CircuitOpen) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_degraded")
            }
            ApiError::Store(StoreError::Persistence(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "persistence_failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            ApiError::Store(e) => e.to_string(),
            ApiError::BadRequest(message) | ApiError::Internal(message) => message.clone(),
        };
        if status.is_server_error() {
            log::warn!("API request failed: {message}");
        }
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
