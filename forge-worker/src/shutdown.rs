//! Shutdown signal handling
//!
//! SIGINT and SIGTERM cancel a shared token. The poller observes it between
//! steps, so an in-flight step finishes and a held task is still reported.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `token` when a shutdown signal arrives
pub fn spawn_signal_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    })
}

/// Completes when SIGINT or SIGTERM is received
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers, using Ctrl+C only");
                    ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => info!(signal = "SIGINT", "Shutdown signal received"),
            _ = sigterm.recv() => info!(signal = "SIGTERM", "Shutdown signal received"),
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            // Without a handler the process can only be stopped externally.
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
