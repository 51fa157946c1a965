//! Process wiring: builds the components from a `Config` and runs commands.
//!
//! Used by the binary; embedders can call `build_orchestrator` and drive the
//! orchestrator directly.

pub mod shutdown;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::api_server::{start_api_server, ApiState};
use crate::cli::Command;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::probe::ReqwestProbe;
use crate::repair::CertbotTool;
use crate::scheduler::Scheduler;
use crate::storage::DomainStateStore;
use crate::tls::TlsInspector;

pub use shutdown::{cancel_on_signal, shutdown_gracefully};

/// Builds the store, inspector, certbot adapter, and orchestrator.
pub async fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>> {
    let clock = Arc::new(SystemClock);
    let store = DomainStateStore::open(&config.db_path, clock.clone(), config.lock_timeout)
        .await
        .with_context(|| format!("Failed to open state store at {}", config.db_path.display()))?;
    let inspector = TlsInspector::new(clock.clone(), config.connect_timeout, config.handshake_timeout)
        .context("Failed to initialize certificate inspector")?;
    let tool = CertbotTool::new(
        config.certbot_path.clone(),
        config.contact_email.clone(),
        config.certbot_args.clone(),
        config.repair_timeout,
    );

    let mut orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(inspector),
        Arc::new(tool),
        clock,
    )
    .with_stale_repair_after(config.cycle_timeout());
    if config.probe_http {
        let probe = ReqwestProbe::new(config.inspect_timeout())
            .context("Failed to initialize HTTP probe")?;
        orchestrator = orchestrator.with_probe(Arc::new(probe));
    }
    Ok(Arc::new(orchestrator))
}

/// Runs one CLI command to completion.
pub async fn run_command(command: Command, config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let orchestrator = build_orchestrator(&config).await?;

    match command {
        Command::Serve { .. } => serve(orchestrator, &config).await,
        Command::State { domain } => print_json(&orchestrator.get_state(&domain).await?),
        Command::Observe { domain } => print_json(&orchestrator.observe(&domain).await?),
        Command::Evaluate { domain, severity } => {
            let cancel = CancellationToken::new();
            let signal_task = cancel_on_signal(cancel.clone());
            let report = orchestrator
                .evaluate_with_deadline(&domain, severity, config.cycle_timeout(), cancel.clone())
                .await;
            shutdown_gracefully(cancel, None, Some(signal_task)).await;
            print_json(&report?)
        }
        Command::SetMode { domain, mode } => {
            print_json(&orchestrator.set_renewal_mode(&domain, mode).await?)
        }
        Command::Approve { domain } => {
            print_json(&orchestrator.record_assisted_approval(&domain).await?)
        }
        Command::Reset { domain } => print_json(&orchestrator.reset_domain(&domain).await?),
        Command::DryRun { domain } => {
            let cancel = CancellationToken::new();
            let signal_task = cancel_on_signal(cancel.clone());
            let report = orchestrator.dry_run(&domain, &cancel).await;
            shutdown_gracefully(cancel, None, Some(signal_task)).await;
            print_json(&report?)
        }
        Command::History { domain, limit } => {
            print_json(&orchestrator.history(&domain, limit).await?)
        }
    }
}

/// Scheduler plus optional API until a shutdown signal arrives.
async fn serve(orchestrator: Arc<Orchestrator>, config: &Config) -> Result<()> {
    let recovered = orchestrator
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted repairs")?;
    if recovered > 0 {
        warn!("Recorded {recovered} interrupted repair(s) from a previous run");
    }

    let cancel = CancellationToken::new();
    let signal_task = cancel_on_signal(cancel.clone());

    let api_task = config.api_bind.map(|bind| {
        let state = ApiState::new(Arc::clone(&orchestrator), config.cycle_timeout(), cancel.clone());
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = start_api_server(bind, state, shutdown.clone()).await {
                log::error!("{e}");
                shutdown.cancel();
            }
        })
    });

    info!(
        "Evaluating domains every {}s with up to {} concurrent cycle(s)",
        config.tick_interval.as_secs(),
        config.max_concurrency
    );
    Scheduler::new(Arc::clone(&orchestrator), config)
        .run(cancel.clone())
        .await;

    shutdown_gracefully(cancel, api_task, Some(signal_task)).await;
    print_json(&orchestrator.stats().snapshot())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode result")?;
    println!("{json}");
    Ok(())
}

