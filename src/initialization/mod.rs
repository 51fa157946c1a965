//! Application initialization and resource setup.
//!
//! This module provides functions to initialize shared resources:
//! - Logger
//! - HTTP probe client
//! - Process-wide TLS crypto provider
//! - Worker pool semaphore

mod client;
mod logger;

use std::sync::Arc;

use rustls::crypto::{ring::default_provider, CryptoProvider};
use tokio::sync::Semaphore;

// Re-export public API
pub use client::init_probe_client;
pub use logger::init_logger_with;

/// Initializes a semaphore bounding concurrent domain evaluations.
pub fn init_semaphore(count: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(count))
}

/// Installs `ring` as the process-wide `rustls` crypto provider.
///
/// The inspector passes its provider explicitly; this covers `reqwest` and
/// any other dependency that builds a default `ClientConfig`.
pub fn init_crypto_provider() {
    // Reinstalling fails harmlessly when a provider is already set
    let _ = CryptoProvider::install_default(default_provider());
}
