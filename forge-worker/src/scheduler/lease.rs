//! Lease tracking
//!
//! The worker treats the lease expiry of a held task as a hard deadline.
//! `LeaseClock` exposes that deadline to the pipeline; `LeaseHandle` moves it
//! forward when the optional heartbeat extends the lease.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::HeartbeatSettings;
use crate::error::TaskError;
use crate::repository::TaskRepository;

/// Creates a clock for a lease expiring at `expires_at`
pub fn lease_clock(expires_at: DateTime<Utc>) -> (LeaseHandle, LeaseClock) {
    let (tx, rx) = watch::channel(expires_at);
    (LeaseHandle { tx }, LeaseClock { rx })
}

/// Read side of the lease deadline
#[derive(Debug, Clone)]
pub struct LeaseClock {
    rx: watch::Receiver<DateTime<Utc>>,
}

impl LeaseClock {
    pub fn expires_at(&self) -> DateTime<Utc> {
        *self.rx.borrow()
    }

    /// Fails with `LeaseExpired` once the deadline has passed
    pub fn ensure_valid(&self) -> Result<(), TaskError> {
        let expires_at = self.expires_at();
        if Utc::now() >= expires_at {
            return Err(TaskError::LeaseExpired { expires_at });
        }
        Ok(())
    }

    /// Resolves when the lease expires, following any extensions
    ///
    /// # Returns
    /// The expiry that was reached
    pub async fn expired(&self) -> DateTime<Utc> {
        let mut rx = self.rx.clone();
        loop {
            let expires_at = *rx.borrow_and_update();
            let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let deadline = Instant::now() + remaining;

            tokio::select! {
                _ = time::sleep_until(deadline) => return expires_at,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // No more extensions can arrive.
                        time::sleep_until(deadline).await;
                        return expires_at;
                    }
                }
            }
        }
    }
}

/// Write side of the lease deadline
#[derive(Debug)]
pub struct LeaseHandle {
    tx: watch::Sender<DateTime<Utc>>,
}

impl LeaseHandle {
    /// Moves the deadline to `expires_at`; earlier values are ignored
    pub fn extend_to(&self, expires_at: DateTime<Utc>) -> bool {
        self.tx.send_if_modified(|current| {
            if expires_at > *current {
                *current = expires_at;
                true
            } else {
                false
            }
        })
    }
}

/// Background heartbeat for one held task; aborted on drop
pub struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts extending the lease of `task_id` every `settings.interval`
///
/// Failures are logged and never fail the task; the lease then simply runs
/// out at its last known expiry.
pub fn spawn_heartbeat(
    repository: Arc<dyn TaskRepository>,
    task_id: String,
    worker_id: String,
    settings: HeartbeatSettings,
    lease: LeaseHandle,
) -> HeartbeatGuard {
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + settings.interval, settings.interval);

        loop {
            ticker.tick().await;

            debug!(task_id = %task_id, "Sending heartbeat");

            match repository
                .heartbeat(&task_id, &worker_id, settings.extend_by)
                .await
            {
                Ok(leased_until) => {
                    let expires_at = leased_until.unwrap_or_else(|| {
                        Utc::now()
                            + chrono::Duration::from_std(settings.extend_by)
                                .unwrap_or(chrono::Duration::zero())
                    });
                    lease.extend_to(expires_at);
                    info!(task_id = %task_id, leased_until = %expires_at, "Lease extended");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to send heartbeat");
                }
            }
        }
    });

    HeartbeatGuard { handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_valid() {
        let (_handle, clock) = lease_clock(Utc::now() + chrono::Duration::minutes(5));
        assert!(clock.ensure_valid().is_ok());

        let (_handle, clock) = lease_clock(Utc::now() - chrono::Duration::seconds(1));
        assert!(matches!(
            clock.ensure_valid(),
            Err(TaskError::LeaseExpired { .. })
        ));
    }

    #[test]
    fn test_extend_only_moves_forward() {
        let start = Utc::now();
        let (handle, clock) = lease_clock(start);

        assert!(handle.extend_to(start + chrono::Duration::seconds(60)));
        assert!(!handle.extend_to(start + chrono::Duration::seconds(30)));
        assert_eq!(clock.expires_at(), start + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_expired_resolves_at_deadline() {
        let expires_at = Utc::now() + chrono::Duration::milliseconds(50);
        let (_handle, clock) = lease_clock(expires_at);

        let reached = time::timeout(Duration::from_secs(5), clock.expired())
            .await
            .expect("lease should expire");
        assert_eq!(reached, expires_at);
    }

    #[tokio::test]
    async fn test_extension_postpones_expiry() {
        let start = Utc::now();
        let (handle, clock) = lease_clock(start + chrono::Duration::milliseconds(100));

        let waiter = tokio::spawn({
            let clock = clock.clone();
            async move { clock.expired().await }
        });

        handle.extend_to(start + chrono::Duration::milliseconds(300));
        let reached = time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("lease should expire")
            .unwrap();
        assert_eq!(reached, start + chrono::Duration::milliseconds(300));
    }
}
