//! HTTP client initialization.

use std::time::Duration;

use reqwest::ClientBuilder;

/// User-Agent sent with every probe request
const PROBE_USER_AGENT: &str = concat!("cert_steward/", env!("CARGO_PKG_VERSION"));

/// Initializes the HTTP client used by the reachability probe.
///
/// Creates a `reqwest::Client` configured with:
/// - A fixed request timeout
/// - Redirects disabled (the first status code is the signal)
/// - Rustls TLS backend (no native TLS)
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_probe_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(PROBE_USER_AGENT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_client_builds() {
        assert!(init_probe_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_probe_user_agent_carries_version() {
        assert!(PROBE_USER_AGENT.starts_with("cert_steward/"));
    }
}
