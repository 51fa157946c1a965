//! Certificate extraction utilities.

use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::x509::X509Name;

const SECONDS_PER_DAY: i64 = 86_400;

/// Fields of the leaf certificate kept on an observation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CertificateFacts {
    pub subject: String,
    pub issuer: String,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

/// Parses the DER-encoded leaf certificate.
///
/// Fails when the certificate cannot be decoded or its `notAfter` is outside
/// the representable range.
pub(crate) fn parse_leaf_certificate(der: &[u8]) -> Result<CertificateFacts, String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| e.to_string())?;
    facts_from_certificate(&cert)
}

fn facts_from_certificate(cert: &X509Certificate<'_>) -> Result<CertificateFacts, String> {
    let validity = cert.validity();
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| "notAfter is out of range".to_string())?;
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0);

    Ok(CertificateFacts {
        subject: display_name(cert.subject()),
        issuer: display_name(cert.issuer()),
        not_before,
        not_after,
    })
}

/// Prefers the organization, then the common name, then the full DN.
fn display_name(name: &X509Name<'_>) -> String {
    let org = name
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok());
    let common_name = name
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok());

    match (org, common_name) {
        (Some(org), Some(cn)) if org != cn => format!("{org} ({cn})"),
        (Some(org), _) => org.to_string(),
        (None, Some(cn)) => cn.to_string(),
        (None, None) => name.to_string(),
    }
}

/// Whole days from `now` until `not_after`, rounded down.
///
/// Negative once the certificate has expired; one second past expiry is -1.
pub(crate) fn days_remaining(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after.timestamp() - now.timestamp()).div_euclid(SECONDS_PER_DAY)
}
