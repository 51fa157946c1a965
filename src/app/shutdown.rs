//! Graceful shutdown handling.

use log::{info, warn};
use tokio_util::sync::CancellationToken;

/// Cancels `cancel` on Ctrl-C (and SIGTERM on unix).
pub fn cancel_on_signal(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = wait_for_signal() => {}
        }
        info!("Shutdown requested, finishing in-flight cycles");
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Shuts down all background tasks gracefully.
///
/// Cancels the shared token, then waits for the API server and the signal
/// listener to exit. Cycles are joined by the scheduler itself.
pub async fn shutdown_gracefully(
    cancel: CancellationToken,
    api_task: Option<tokio::task::JoinHandle<()>>,
    signal_task: Option<tokio::task::JoinHandle<()>>,
) {
    cancel.cancel();
    if let Some(api_task) = api_task {
        let _ = api_task.await;
    }
    if let Some(signal_task) = signal_task {
        let _ = signal_task.await;
    }
}
