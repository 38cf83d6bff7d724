//! Forge Supervisor
//!
//! Runs `forge-worker` as a child process and keeps it running:
//! - Exit code 0 means a deliberate shutdown; supervision ends with 0
//! - Any other exit, including death by signal, restarts the worker after
//!   `FORGE_RESTART_DELAY_SECONDS` (default 5)
//!
//! SIGINT and SIGTERM are forwarded to the worker as SIGTERM. The supervisor
//! then waits for the worker to finish its current step and exits.
//!
//! Arguments are passed through to the worker unchanged. The worker binary is
//! taken from `FORGE_WORKER_BIN`, or found next to the supervisor.

#[path = "../shutdown.rs"]
mod shutdown;

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_RESTART_DELAY_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "forge_supervisor=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let program = worker_program()?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let restart_delay = restart_delay()?;

    let stop = CancellationToken::new();
    shutdown::spawn_signal_listener(stop.clone());

    info!(
        "Supervising {} (restart delay: {:?})",
        program.display(),
        restart_delay
    );

    let mut starts: u32 = 0;

    loop {
        starts += 1;
        info!(start = starts, "Starting worker");

        let mut child = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start worker {}", program.display()))?;

        let status = tokio::select! {
            status = child.wait() => status.context("Failed to wait for worker")?,
            _ = stop.cancelled() => {
                info!("Stopping worker");
                let status = stop_child(&mut child).await?;
                info!("Worker stopped ({}), supervisor exiting", describe(&status));
                return Ok(());
            }
        };

        if status.success() {
            info!("Worker exited cleanly, not restarting");
            return Ok(());
        }

        error!(
            "Worker terminated abnormally ({}), restarting in {:?}",
            describe(&status),
            restart_delay
        );

        tokio::select! {
            _ = tokio::time::sleep(restart_delay) => {}
            _ = stop.cancelled() => {
                info!("Shutdown requested while waiting to restart, exiting");
                return Ok(());
            }
        }
    }
}

/// Asks the worker to stop gracefully and waits for it
async fn stop_child(child: &mut Child) -> Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let sent = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await;

        match sent {
            Ok(status) if status.success() => {
                return child.wait().await.context("Failed to wait for worker");
            }
            Ok(status) => warn!("Could not signal worker ({}), killing it", status),
            Err(e) => warn!("Could not signal worker ({}), killing it", e),
        }
    }

    if let Err(e) = child.start_kill() {
        warn!("Failed to kill worker: {}", e);
    }
    child.wait().await.context("Failed to wait for worker")
}

fn worker_program() -> Result<PathBuf> {
    if let Some(program) = std::env::var_os("FORGE_WORKER_BIN") {
        return Ok(PathBuf::from(program));
    }

    let current = std::env::current_exe().context("Failed to locate supervisor executable")?;
    let dir = current
        .parent()
        .context("Supervisor executable has no parent directory")?;
    Ok(dir.join(format!("forge-worker{}", std::env::consts::EXE_SUFFIX)))
}

fn restart_delay() -> Result<Duration> {
    match std::env::var("FORGE_RESTART_DELAY_SECONDS") {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .context("FORGE_RESTART_DELAY_SECONDS has an invalid value")?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(DEFAULT_RESTART_DELAY_SECS)),
    }
}

fn describe(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}
