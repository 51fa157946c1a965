//! HTTP API over the orchestrator.
//!
//! A thin layer: every handler calls one orchestrator operation and returns
//! its structured result as JSON.
//!
//! - `GET /domains/{domain}` - current state
//! - `POST /domains/{domain}/observe` - fresh inspection
//! - `POST /domains/{domain}/evaluate?severity=` - one full cycle
//! - `PUT /domains/{domain}/mode` - set the renewal mode
//! - `POST /domains/{domain}/approve` - record an assisted approval
//! - `POST /domains/{domain}/reset` - operator reset
//! - `POST /domains/{domain}/dry-run` - tool dry run
//! - `GET /domains/{domain}/history?limit=` - journal, newest first
//! - `GET /status` - cycle counters

mod error;
mod handlers;
mod types;

use std::net::SocketAddr;

use axum::routing::{get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;

pub use error::ApiError;
pub use types::ApiState;

/// Builds the router. Separate from `start_api_server` so tests can drive it.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/domains/{domain}", get(handlers::get_state))
        .route("/domains/{domain}/observe", post(handlers::observe))
        .route("/domains/{domain}/evaluate", post(handlers::evaluate))
        .route("/domains/{domain}/mode", put(handlers::set_mode))
        .route("/domains/{domain}/approve", post(handlers::approve))
        .route("/domains/{domain}/reset", post(handlers::reset))
        .route("/domains/{domain}/dry-run", post(handlers::dry_run))
        .route("/domains/{domain}/history", get(handlers::history))
        .route("/status", get(handlers::status))
        .with_state(state)
}

/// Serves the API until `shutdown` fires.
pub async fn start_api_server(
    bind: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind API server to {}: {}", bind, e))?;

    log::info!("API server listening on http://{}/", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    Ok(())
}
