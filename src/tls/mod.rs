//! TLS certificate inspection.
//!
//! This module connects to a domain on port 443 and turns the handshake into
//! an `Observation`:
//! - Chain validity against the webpki trust anchors (with SNI)
//! - Subject, issuer, and validity period of the leaf certificate
//! - Whole days remaining until expiry (negative once expired)
//! - Negotiated TLS version
//!
//! Inspection never fails: every network, handshake, and parsing failure is
//! classified into an `InspectErrorKind` and returned as `valid = false`.
//! There are no retries here; the orchestrator decides what happens next.
//!
//! Uses `tokio-rustls` for async TLS connections and `x509-parser` for certificate parsing.

mod extract;
mod verifier;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::clock::Clock;
use crate::config::TLS_PORT;
use crate::error_handling::{
    categorize_certificate_error, categorize_handshake_error, categorize_io_error,
    InitializationError, InspectErrorKind,
};
use crate::models::Observation;

use extract::{days_remaining, parse_leaf_certificate};
use verifier::RecordingVerifier;

/// Produces a terminal observation for a normalized hostname.
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, domain: &str) -> Observation;
}

/// Inspector backed by a real TLS handshake.
pub struct TlsInspector {
    provider: Arc<CryptoProvider>,
    webpki: Arc<WebPkiServerVerifier>,
    clock: Arc<dyn Clock>,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TlsInspector {
    /// Builds the inspector with the bundled webpki trust anchors.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::TlsConfigError` if the verifier cannot be
    /// built from the root store.
    pub fn new(
        clock: Arc<dyn Clock>,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<Self, InitializationError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(ring::default_provider());
        let webpki =
            WebPkiServerVerifier::builder_with_provider(Arc::new(root_store), provider.clone())
                .build()
                .map_err(|e| InitializationError::TlsConfigError(e.to_string()))?;

        Ok(TlsInspector {
            provider,
            webpki,
            clock,
            connect_timeout,
            handshake_timeout,
        })
    }

    fn client_config(
        &self,
        recorder: Arc<RecordingVerifier>,
    ) -> Result<ClientConfig, rustls::Error> {
        Ok(ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(recorder)
            .with_no_client_auth())
    }

    async fn resolve(&self, domain: &str) -> Result<Vec<SocketAddr>, Observation> {
        let lookup = tokio::time::timeout(
            self.connect_timeout,
            tokio::net::lookup_host((domain, TLS_PORT)),
        )
        .await;

        match lookup {
            Ok(Ok(addrs)) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                if addrs.is_empty() {
                    Err(self.failed(InspectErrorKind::DnsResolutionFailed, "no addresses"))
                } else {
                    Ok(addrs)
                }
            }
            Ok(Err(e)) => Err(self.failed(InspectErrorKind::DnsResolutionFailed, e.to_string())),
            Err(_) => Err(self.failed(
                InspectErrorKind::DnsResolutionFailed,
                format!("lookup timed out after {}s", self.connect_timeout.as_secs()),
            )),
        }
    }

    fn failed(&self, kind: InspectErrorKind, detail: impl Into<String>) -> Observation {
        Observation::failed(kind, detail, self.clock.now())
    }
}

#[async_trait]
impl CertificateInspector for TlsInspector {
    async fn inspect(&self, domain: &str) -> Observation {
        debug!("Inspecting TLS certificate for {domain}");

        let server_name = match ServerName::try_from(domain.to_string()) {
            Ok(name) => name,
            Err(e) => return self.failed(InspectErrorKind::InvalidHostname, e.to_string()),
        };

        let addrs = match self.resolve(domain).await {
            Ok(addrs) => addrs,
            Err(observation) => return observation,
        };

        let sock = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addrs[..]))
            .await
        {
            Ok(Ok(sock)) => sock,
            Ok(Err(e)) => {
                warn!("Failed to connect to {domain}:{TLS_PORT} - {e}");
                return self.failed(categorize_io_error(&e), e.to_string());
            }
            Err(_) => {
                warn!("TCP connection timeout for {domain}:{TLS_PORT}");
                return self.failed(
                    InspectErrorKind::ConnectTimeout,
                    format!("{}s", self.connect_timeout.as_secs()),
                );
            }
        };

        let recorder = Arc::new(RecordingVerifier::new(self.webpki.clone()));
        let config = match self.client_config(recorder.clone()) {
            Ok(config) => config,
            Err(e) => return self.failed(InspectErrorKind::HandshakeFailed, e.to_string()),
        };
        let connector = TlsConnector::from(Arc::new(config));

        let tls_stream = match tokio::time::timeout(
            self.handshake_timeout,
            connector.connect(server_name, sock),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("TLS handshake failed for {domain}: {e}");
                return self.failed(categorize_handshake_error(&e), e.to_string());
            }
            Err(_) => {
                warn!("TLS handshake timeout for {domain}");
                return self.failed(
                    InspectErrorKind::HandshakeTimeout,
                    format!("{}s", self.handshake_timeout.as_secs()),
                );
            }
        };

        let connection = tls_stream.get_ref().1;
        let tls_version = connection.protocol_version().map(|v| format!("{v:?}"));
        let Some(leaf) = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
        else {
            return self.failed(InspectErrorKind::NoPeerCertificate, "");
        };

        let facts = match parse_leaf_certificate(leaf.as_ref()) {
            Ok(facts) => facts,
            Err(e) => return self.failed(InspectErrorKind::UnparsableCertificate, e),
        };

        let now = self.clock.now();
        let days = days_remaining(facts.not_after, now);
        let mut observation = Observation {
            valid: true,
            issuer: Some(facts.issuer),
            subject: Some(facts.subject),
            not_before: facts.not_before,
            expires_at: Some(facts.not_after),
            days_remaining: Some(days),
            tls_version,
            observed_at: now,
            ..Default::default()
        };

        if let Some(verdict) = recorder.take_verdict() {
            let kind = categorize_certificate_error(&verdict);
            observation.valid = false;
            observation.error = Some(format!("{}: {}", kind.as_str(), verdict));
            observation.error_kind = Some(kind);
        }

        info!(
            "Inspected {domain}: valid={} days_remaining={days}",
            observation.valid
        );
        observation
    }
}
