//! Task poller
//!
//! Polls the control plane for the next task and runs it through the
//! pipeline: fetch the input, compute, upload the output, report. One task is
//! fully drained, including report and cleanup, before the next poll.

use anyhow::Result;
use chrono::Utc;
use forge_client::{ClientError, Task, TaskOutcome, TransferDirection};
use forge_core::domain::transfer::content_type_for;
use forge_core::params::ResolvedParams;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::TaskContext;
use crate::error::TaskError;
use crate::repository::{ArtifactStore, TaskRepository};
use crate::scheduler::lease::{lease_clock, spawn_heartbeat};
use crate::service::ComputeInvoker;
use crate::workspace::WorkingSet;

/// Pause after each processed task before polling again
pub const POST_TASK_PAUSE: Duration = Duration::from_secs(1);

/// Poller that claims and processes one task at a time
pub struct TaskPoller {
    config: Arc<Config>,
    repository: Arc<dyn TaskRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    compute: Arc<dyn ComputeInvoker>,
    shutdown: CancellationToken,
}

impl TaskPoller {
    /// Creates a new task poller
    pub fn new(
        config: Arc<Config>,
        repository: Arc<dyn TaskRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        compute: Arc<dyn ComputeInvoker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            repository,
            artifacts,
            compute,
            shutdown,
        }
    }

    /// Runs the polling loop until shutdown is requested
    ///
    /// Returns an error only before the first successful poll: at once for a
    /// permanent error such as a rejected credential, and after
    /// `startup_retries` attempts for transient ones.
    pub async fn run(&self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            "Starting task poller (interval: {:?}, lease: {:?})",
            self.config.poll_interval,
            self.config.lease_duration
        );

        let mut connected = false;
        let mut failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, leaving poll loop");
                return Ok(());
            }

            debug!("Polling for next task");

            match self
                .repository
                .poll_next_task(&self.config.worker_id, self.config.lease_duration)
                .await
            {
                Ok(Some(task)) => {
                    connected = true;
                    failures = 0;

                    self.process_task(task).await;
                    self.pause(POST_TASK_PAUSE).await;
                }
                Ok(None) => {
                    connected = true;
                    failures = 0;

                    debug!("No task available");
                    self.pause(self.config.poll_interval).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);

                    if !connected && !e.is_transient() {
                        error!(kind = e.kind(), error = %e, "Control plane rejected the worker");
                        return Err(anyhow::anyhow!("Control plane rejected the worker: {}", e));
                    }

                    if !connected && failures >= self.config.startup_retries {
                        error!(
                            kind = e.kind(),
                            "Control plane unreachable after {} attempt(s)", failures
                        );
                        return Err(anyhow::anyhow!(
                            "Failed to reach control plane after {} attempt(s): {}",
                            failures,
                            e
                        ));
                    }

                    let delay =
                        backoff_delay(self.config.poll_interval, self.config.max_backoff, failures);
                    warn!(
                        kind = e.kind(),
                        error = %e,
                        "Failed to poll for task (attempt {}), retrying in {:?}",
                        failures,
                        delay
                    );
                    self.pause(delay).await;
                }
            }
        }
    }

    /// Processes one claimed task through report and cleanup
    ///
    /// Never fails: every error becomes a `failed` outcome, and exactly one
    /// report is attempted for the task.
    pub async fn process_task(&self, task: Task) -> TaskOutcome {
        let task_id = task.item_id.clone();
        info!(
            task_id = %task_id,
            leased_until = %task.lease_expiry,
            lease_remaining = ?task.lease_remaining(Utc::now()),
            "Claimed task"
        );

        let (lease_handle, lease) = lease_clock(task.lease_expiry);
        let heartbeat = self.config.heartbeat.map(|settings| {
            spawn_heartbeat(
                Arc::clone(&self.repository),
                task_id.clone(),
                self.config.worker_id.clone(),
                settings,
                lease_handle,
            )
        });

        let (result, context) = match WorkingSet::create(&self.config.temp_dir, &task_id) {
            Ok(working_set) => {
                let context = TaskContext::new(task, working_set, lease);
                let result = AssertUnwindSafe(self.execute_pipeline(&context))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(TaskError::Internal(panic_message(panic))));
                (result, Some(context))
            }
            Err(e) => (Err(TaskError::Workspace(e)), None),
        };

        drop(heartbeat);

        let outcome = match result {
            Ok(output_path) => {
                info!(task_id = %task_id, output_path = %output_path, "Task completed");
                TaskOutcome::done(output_path)
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    kind = e.kind(),
                    error = %e,
                    diagnostics = e.diagnostics().unwrap_or_default(),
                    "Task failed"
                );
                TaskOutcome::failed(e.to_string())
            }
        };

        match self.repository.report_result(&task_id, &outcome).await {
            Ok(()) => info!(task_id = %task_id, status = %outcome.status(), "Reported result"),
            Err(e) => error!(
                task_id = %task_id,
                kind = e.kind(),
                error = %e,
                "Failed to report result, leaving the task to lease expiry"
            ),
        }

        if let Some(context) = context {
            if let Err(e) = context.release() {
                warn!(task_id = %task_id, error = %e, "Failed to remove working set");
            }
        }

        outcome
    }

    /// Runs the pipeline steps for one task
    ///
    /// # Returns
    /// The control-plane reference of the uploaded output
    async fn execute_pipeline(&self, context: &TaskContext) -> Result<String, TaskError> {
        let task_id = context.task_id();

        let params = ResolvedParams::resolve(&context.task, self.config.frame_num)?;
        debug!(task_id = %task_id, frame_count = params.frame_count, "Resolved parameters");

        // Fetch
        self.checkpoint(context, "download")?;
        let download = self
            .repository
            .request_transfer_url(task_id, TransferDirection::DownloadInput, None, None)
            .await?;
        let input = context.input_path();
        let bytes = self.artifacts.download(&download, &input).await?;
        info!(task_id = %task_id, bytes, "Downloaded input artifact");

        // Compute
        self.checkpoint(context, "compute")?;
        let output = context.output_path();
        info!(task_id = %task_id, frame_count = params.frame_count, "Starting compute");
        let produced = tokio::select! {
            result = self.compute.run(&input, &output, &params) => result?,
            expires_at = context.lease.expired() => {
                warn!(task_id = %task_id, "Lease expired during compute, stopping it");
                return Err(TaskError::LeaseExpired { expires_at });
            }
        };
        info!(task_id = %task_id, output = %produced.display(), "Compute finished");

        // Upload
        context.lease.ensure_valid()?;
        let filename = produced
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned);
        let upload = self
            .repository
            .request_transfer_url(
                task_id,
                TransferDirection::UploadOutput,
                Some(content_type_for(&produced)),
                filename.as_deref(),
            )
            .await?;
        let output_path = upload.output_path.clone().ok_or_else(|| {
            ClientError::Protocol("upload capability has no output_path".to_string())
        })?;
        let bytes = self.artifacts.upload(&upload, &produced).await?;
        info!(task_id = %task_id, bytes, "Uploaded output artifact");

        Ok(output_path)
    }

    /// Fails the task when shutdown was requested or the lease ran out
    fn checkpoint(&self, context: &TaskContext, step: &'static str) -> Result<(), TaskError> {
        if self.shutdown.is_cancelled() {
            return Err(TaskError::ShuttingDown { step });
        }
        context.lease.ensure_valid()
    }

    /// Sleeps for `duration`, waking early on shutdown
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = time::sleep(duration) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}

/// Delay after `failures` consecutive failed polls
///
/// Doubles from `base` with every failure, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("pipeline panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("pipeline panicked: {}", message)
    } else {
        "pipeline panicked".to_string()
    }
}
