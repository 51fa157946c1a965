//! Failure backoff schedule.

use std::time::Duration;

use crate::config::{BACKOFF_BASE, BACKOFF_CAP};

/// Cooldown after the `consecutive_failures`-th failure in a row.
///
/// `BACKOFF_BASE * 2^(n-1)`, capped at `BACKOFF_CAP`: 15m, 30m, 1h, 2h, ...
/// 24h. Zero failures means no cooldown.
pub fn backoff_for(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }
    let exponent = (consecutive_failures - 1).min(16);
    BACKOFF_BASE
        .checked_mul(1u32 << exponent)
        .map_or(BACKOFF_CAP, |delay| delay.min(BACKOFF_CAP))
}
