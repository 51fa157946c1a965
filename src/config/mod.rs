//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (thresholds, timeouts, limits)
//! - The library `Config` struct and its validation
//! - Log option types shared with CLI parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, LogFormat, LogLevel};
