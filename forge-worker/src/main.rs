//! Forge Worker
//!
//! A lease-based worker that turns one input image into one generated video
//! per task.
//!
//! Architecture:
//! - Configuration: TOML file and `FORGE_*` environment variables
//! - Repositories: control-plane and artifact-storage access (traits over `forge-client`)
//! - Services: the external compute routine
//! - Scheduler: polling, lease tracking and the per-task pipeline
//!
//! The worker polls the control plane, claims a task under a lease, fetches
//! its input, runs the compute routine, uploads the output and reports the
//! result. It exits 0 after a requested shutdown and non-zero on fatal
//! startup errors, which is what the supervisor keys restarts on.

mod config;
mod context;
mod error;
mod logging;
mod repository;
mod scheduler;
mod service;
mod shutdown;
mod workspace;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::repository::{ArtifactStore, TaskRepository};
use crate::scheduler::TaskPoller;
use crate::service::{ComputeInvoker, ProcessComputeInvoker};
use forge_client::{ArtifactClient, ControlPlaneClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("FORGE_CONFIG"))
        .map(PathBuf::from);

    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    let _log_guard = logging::init(config.log_dir.as_deref(), &config.worker_id);

    info!("Starting Forge worker");
    info!(
        "Loaded configuration: worker_id={}, endpoint={}",
        config.worker_id, config.endpoint
    );

    if let Err(e) = config.compute.verify() {
        error!("Compute environment is not usable: {:#}", e);
        return Err(e.context("Compute environment is not usable"));
    }

    let client = ControlPlaneClient::new(
        config.endpoint.clone(),
        &config.worker_token,
        config.api_timeout,
    )
    .context("Failed to create control-plane client")?;
    let artifacts =
        ArtifactClient::new(config.transfer_timeout).context("Failed to create artifact client")?;

    info!("Control-plane client initialized");

    let repository: Arc<dyn TaskRepository> = Arc::new(client);
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(artifacts);
    let compute: Arc<dyn ComputeInvoker> =
        Arc::new(ProcessComputeInvoker::new(config.compute.clone()));

    let shutdown = CancellationToken::new();
    shutdown::spawn_signal_listener(shutdown.clone());

    info!(
        "Poll interval: {:?}, lease duration: {:?}, heartbeat: {}",
        config.poll_interval,
        config.lease_duration,
        if config.heartbeat.is_some() { "enabled" } else { "disabled" }
    );

    let poller = TaskPoller::new(Arc::new(config), repository, artifacts, compute, shutdown);

    info!("Starting task polling loop");
    if let Err(e) = poller.run().await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    info!("Worker stopped");
    Ok(())
}
