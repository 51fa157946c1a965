//! External certificate tool invocation.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error_handling::ToolError;

use super::output::combine_output;

/// Whether the tool should really issue a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    /// Exercise the issuance path against the staging endpoint only
    DryRun,
}

/// A completed tool run (it started and exited on its own).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub success: bool,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Sanitized tail of stdout and stderr
    pub output: String,
}

/// An opaque, slow, fallible certificate issuance operation.
///
/// Implementations must honour `cancel` and never leave a child process
/// running after they return.
#[async_trait]
pub trait RepairTool: Send + Sync {
    async fn run(
        &self,
        domain: &str,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError>;
}

/// Runs `certbot certonly` non-interactively for one domain.
#[derive(Debug, Clone)]
pub struct CertbotTool {
    program: PathBuf,
    contact_email: Option<String>,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl CertbotTool {
    pub fn new(
        program: PathBuf,
        contact_email: Option<String>,
        extra_args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        CertbotTool {
            program,
            contact_email,
            extra_args,
            timeout,
        }
    }

    /// Command-line arguments for one invocation.
    ///
    /// # Errors
    ///
    /// `ToolError::MissingContact` when no contact email is configured.
    pub fn build_args(&self, domain: &str, mode: RunMode) -> Result<Vec<String>, ToolError> {
        let email = self
            .contact_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or(ToolError::MissingContact)?;

        let mut args: Vec<String> = [
            "certonly",
            "--non-interactive",
            "--agree-tos",
            "--email",
            email,
            "--cert-name",
            domain,
            "-d",
            domain,
            "--keep-until-expiring",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if mode == RunMode::DryRun {
            args.push("--dry-run".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        Ok(args)
    }
}

#[async_trait]
impl RepairTool for CertbotTool {
    async fn run(
        &self,
        domain: &str,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        let args = self.build_args(domain, mode)?;
        debug!("Running {} {}", self.program.display(), args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ToolError::NotFound(self.program.display().to_string())
                } else {
                    ToolError::Spawn(e)
                }
            })?;

        // Dropping `child` (on timeout or cancel) kills the process
        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ToolError::Spawn(e)),
                Err(_) => {
                    warn!(
                        "Certificate tool for {domain} exceeded {}s, killed",
                        self.timeout.as_secs()
                    );
                    return Err(ToolError::Timeout(self.timeout.as_secs()));
                }
            },
            _ = cancel.cancelled() => {
                info!("Certificate tool for {domain} cancelled, killed");
                return Err(ToolError::Cancelled);
            }
        };

        Ok(ToolRun {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combine_output(&output.stdout, &output.stderr),
        })
    }
}
