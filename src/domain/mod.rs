//! Domain normalization.
//!
//! Every store key passes through `normalize_domain()` so that raw inputs
//! differing only in case, scheme, port, path, or a trailing dot map to one
//! record.

use url::{Host, Url};

use crate::error_handling::DomainError;

/// Longest accepted hostname (RFC 1035)
const MAX_DOMAIN_LENGTH: usize = 253;
/// Longest accepted label
const MAX_LABEL_LENGTH: usize = 63;

/// Normalizes a raw hostname or URL into the canonical store key.
///
/// Accepts bare hosts (`Example.com`) and URLs (`https://example.com:8443/x`).
/// The result is lowercase, carries no scheme, userinfo, port, path, query,
/// fragment, or trailing dot, and internationalized names come back as
/// punycode.
///
/// # Errors
///
/// Returns `DomainError` for empty input, IP literals, names over 253
/// characters, and labels that are empty, too long, or contain anything
/// outside `[a-z0-9-]`.
pub fn normalize_domain(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Empty);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        Url::parse(&candidate).map_err(|_| DomainError::Unparsable(trimmed.to_string()))?;

    let host = match parsed.host() {
        Some(Host::Domain(host)) => host.to_string(),
        Some(Host::Ipv4(ip)) => return Err(DomainError::IpAddress(ip.to_string())),
        Some(Host::Ipv6(ip)) => return Err(DomainError::IpAddress(ip.to_string())),
        None => return Err(DomainError::Unparsable(trimmed.to_string())),
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return Err(DomainError::Empty);
    }
    if host.len() > MAX_DOMAIN_LENGTH {
        return Err(DomainError::TooLong(host.len()));
    }

    for label in host.split('.') {
        if !is_valid_label(label) {
            return Err(DomainError::InvalidLabel(label.to_string()));
        }
    }

    Ok(host)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LENGTH
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
