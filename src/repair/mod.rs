//! Certificate repair.
//!
//! - `tool`: the external certificate tool seam and the certbot adapter
//! - `output`: sanitizing, capping, and classifying tool output
//! - `executor`: one-at-a-time execution per domain plus post-repair verification

mod executor;
mod output;
mod tool;

pub use executor::{
    RepairExecutor, RepairResult, REASON_ALREADY_IN_FLIGHT, REASON_DRY_RUN_PASSED,
    REASON_RENEWED, REASON_VERIFICATION_FAILED,
};
pub use output::{classify_failure, combine_output, sanitize_output, truncate_error};
pub use tool::{CertbotTool, RepairTool, RunMode, ToolRun};

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
