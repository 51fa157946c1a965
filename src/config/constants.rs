//! Configuration constants.
//!
//! This module defines the thresholds, timeouts, and limits used by the
//! inspection, policy, repair, and persistence layers.

use std::time::Duration;

pub const DB_PATH: &str = "./cert_steward.db";

// Network operation timeouts
/// TCP connection timeout in seconds
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 5;
/// TLS handshake timeout in seconds
pub const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 5;
/// Port every inspection connects to
pub const TLS_PORT: u16 = 443;

// Health classification
/// A certificate with this many days left (or fewer) needs attention
pub const EXPIRING_SOON_DAYS: i64 = 15;
/// A freshly repaired certificate must have more than this many days left
pub const POST_REPAIR_MIN_DAYS: i64 = 10;

// Policy
/// Trailing window the rate limit looks at
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Repairs are blocked once more than this many tool invocations fall inside the window
pub const RATE_LIMIT_MAX_ATTEMPTS: usize = 3;
/// Consecutive failures that require assisted approval for further attempts
pub const ASSISTED_ESCALATION_FAILURES: u32 = 3;
/// Consecutive failures that lock the domain until an operator reset
pub const MANUAL_ESCALATION_FAILURES: u32 = 4;

// Failure backoff
/// First cooldown after a failed repair (15 minutes)
pub const BACKOFF_BASE: Duration = Duration::from_secs(15 * 60);
/// Upper bound for the cooldown (24 hours)
pub const BACKOFF_CAP: Duration = Duration::from_secs(24 * 60 * 60);

// Repair tool
/// Default repair subprocess timeout in seconds
pub const DEFAULT_REPAIR_TIMEOUT_SECS: u64 = 180;
/// Lower bound accepted for the repair timeout
pub const MIN_REPAIR_TIMEOUT_SECS: u64 = 1;
/// Upper bound accepted for the repair timeout
pub const MAX_REPAIR_TIMEOUT_SECS: u64 = 3600;
/// Default certificate tool binary
pub const DEFAULT_CERTBOT_PATH: &str = "certbot";
/// Tool output kept on an attempt record (tail of stdout + stderr)
pub const MAX_TOOL_OUTPUT_CHARS: usize = 2000;

// Error message size limits
/// Maximum error message length in characters (2000 chars)
/// Error messages longer than this are truncated with a note about the original length
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2000;

// Concurrency and scheduling
/// Default number of domains evaluated concurrently
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Hard ceiling for the worker pool
pub const MAX_CONCURRENCY_LIMIT: usize = 20;
/// Default interval between scheduled evaluation passes (6 hours)
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 6 * 60 * 60;
/// Shortest interval the scheduler accepts
pub const MIN_TICK_INTERVAL_SECS: u64 = 60;
/// Longest random delay before a scheduled cycle starts
pub const SCHEDULER_JITTER_MAX_MS: u64 = 2000;
/// Default deadline for acquiring a per-domain lock in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

// Persistence retry strategy
/// Initial delay in milliseconds before retrying a failed commit
pub const STORE_RETRY_INITIAL_DELAY_MS: u64 = 100;
/// Factor by which retry delay is multiplied on each attempt
pub const STORE_RETRY_FACTOR: u64 = 2;
/// Maximum delay between commit retries in seconds
pub const STORE_RETRY_MAX_DELAY_SECS: u64 = 2;
/// Commit retries after the first attempt fails
pub const STORE_RETRY_MAX_ATTEMPTS: usize = 3;
/// Times a mutation is re-run after another writer committed first
pub const STORE_CONFLICT_MAX_RETRIES: usize = 5;

// Store write circuit breaker
/// Consecutive failed commits (after retries) that open the write circuit
pub const STORE_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long the write circuit stays open before a trial commit
pub const STORE_CIRCUIT_COOLDOWN_SECS: u64 = 60;

// History
/// Journal entries returned when the caller does not ask for a limit
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Journal entries returned at most
pub const MAX_HISTORY_LIMIT: u32 = 1000;
