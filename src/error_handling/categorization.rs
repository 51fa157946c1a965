//! Error categorization and retry strategy.

use std::io;
use std::time::Duration;

use rustls::CertificateError;
use tokio_retry::strategy::ExponentialBackoff;

use super::types::InspectErrorKind;

/// Retry strategy for state store commits.
///
/// Returns an iterator of delays for exponential backoff. The strategy yields
/// at most `STORE_RETRY_MAX_ATTEMPTS` delays, capped at
/// `STORE_RETRY_MAX_DELAY_SECS` each.
pub fn get_retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(crate::config::STORE_RETRY_INITIAL_DELAY_MS)
        .factor(crate::config::STORE_RETRY_FACTOR)
        .max_delay(Duration::from_secs(crate::config::STORE_RETRY_MAX_DELAY_SECS))
        .take(crate::config::STORE_RETRY_MAX_ATTEMPTS)
}

/// Categorizes a TCP-level failure.
pub fn categorize_io_error(error: &io::Error) -> InspectErrorKind {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => InspectErrorKind::ConnectionRefused,
        io::ErrorKind::TimedOut => InspectErrorKind::ConnectTimeout,
        _ => InspectErrorKind::IoError,
    }
}

/// Categorizes a certificate verification verdict from the webpki verifier.
pub fn categorize_certificate_error(error: &rustls::Error) -> InspectErrorKind {
    let rustls::Error::InvalidCertificate(cert_error) = error else {
        return InspectErrorKind::HandshakeFailed;
    };

    match cert_error {
        CertificateError::Expired => InspectErrorKind::CertificateExpired,
        CertificateError::NotValidYet => InspectErrorKind::CertificateNotYetValid,
        CertificateError::NotValidForName => InspectErrorKind::HostnameMismatch,
        CertificateError::UnknownIssuer => InspectErrorKind::UntrustedIssuer,
        CertificateError::Revoked => InspectErrorKind::CertificateRevoked,
        CertificateError::BadEncoding => InspectErrorKind::UnparsableCertificate,
        other => {
            // Newer rustls releases report context-carrying variants
            // (e.g. `ExpiredContext { .. }`); match those by name.
            let debug = format!("{other:?}");
            if debug.starts_with("Expired") {
                InspectErrorKind::CertificateExpired
            } else if debug.starts_with("NotValidYet") {
                InspectErrorKind::CertificateNotYetValid
            } else if debug.starts_with("NotValidForName") {
                InspectErrorKind::HostnameMismatch
            } else {
                InspectErrorKind::InvalidCertificate
            }
        }
    }
}

/// Categorizes a failed TLS handshake.
///
/// The underlying `rustls::Error` travels inside an `io::Error` produced by
/// `tokio-rustls`; when it is present it decides the category.
pub fn categorize_handshake_error(error: &io::Error) -> InspectErrorKind {
    if let Some(tls_error) = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return match tls_error {
            rustls::Error::InvalidCertificate(_) => categorize_certificate_error(tls_error),
            _ => InspectErrorKind::HandshakeFailed,
        };
    }
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::InvalidData => InspectErrorKind::HandshakeFailed,
        _ => InspectErrorKind::IoError,
    }
}
