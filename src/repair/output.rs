//! Tool output sanitization and failure classification.
//!
//! Certificate tool output is untrusted text: control characters and ANSI
//! escapes are removed before it is stored, and only the tail is kept since
//! that is where the tool reports what went wrong.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{MAX_ERROR_MESSAGE_LENGTH, MAX_TOOL_OUTPUT_CHARS};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI escape pattern is a valid regex")
});

/// Known failure signatures, checked in order.
static FAILURE_SIGNATURES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(?i)too many (certificates|failed authorizations|requests|new orders)|error:ratelimited|rate limit",
            "acme_rate_limited",
        ),
        (
            r"(?i)dns problem|nxdomain|no valid (a|aaaa) records|error:dns|servfail",
            "dns_problem",
        ),
        (
            r"(?i)error:unauthorized|invalid response from|incorrect txt record",
            "challenge_unauthorized",
        ),
        (
            r"(?i)error:connection|timeout during connect|connection refused|fetching http://",
            "challenge_connection_failed",
        ),
        (
            r"(?i)error:accountdoesnotexist|error:invalidcontact|account (does not exist|problem)|unable to register",
            "account_problem",
        ),
    ]
    .into_iter()
    .map(|(pattern, code)| {
        (
            Regex::new(pattern).expect("failure signature is a valid regex"),
            code,
        )
    })
    .collect()
});

/// Removes ANSI escapes and control characters (keeping newline, tab, CR).
pub fn sanitize_output(message: &str) -> String {
    ANSI_ESCAPE
        .replace_all(message, "")
        .chars()
        .filter(|c| !c.is_control() || matches!(*c, '\n' | '\t' | '\r'))
        .collect()
}

/// Last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Sanitized stdout followed by stderr, capped to the stored tail.
pub fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let combined = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (true, true) => String::new(),
    };
    tail_chars(&sanitize_output(&combined), MAX_TOOL_OUTPUT_CHARS)
}

/// Sanitizes and truncates an error message for storage.
///
/// Keeps the head of the message and notes the original length when it had
/// to be cut.
pub fn truncate_error(message: &str) -> String {
    let sanitized = sanitize_output(message);
    let count = sanitized.chars().count();
    if count <= MAX_ERROR_MESSAGE_LENGTH {
        return sanitized;
    }
    let keep = MAX_ERROR_MESSAGE_LENGTH.saturating_sub(50);
    let head: String = sanitized.chars().take(keep).collect();
    format!("{head}... (truncated, original length: {count} chars)")
}

/// Reason code for a failed tool run.
pub fn classify_failure(output: &str, exit_code: Option<i32>) -> String {
    for (pattern, code) in FAILURE_SIGNATURES.iter() {
        if pattern.is_match(output) {
            return (*code).to_string();
        }
    }
    match exit_code {
        Some(code) => format!("tool_exit_{code}"),
        None => "tool_exit_signal".to_string(),
    }
}
