//! Tasks repository
//!
//! Handles communication with the control plane for task-related operations:
//! - Polling for the next task
//! - Requesting capability URLs
//! - Reporting results
//! - Extending leases

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forge_client::{CapabilityUrl, ClientError, ControlPlaneClient, Task, TaskOutcome, TransferDirection};
use std::time::Duration;

/// Repository trait for task operations with the control plane
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Claims at most one task, or returns `None` when there is no work
    async fn poll_next_task(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Task>, ClientError>;

    /// Obtains a capability URL for one transfer of a held task
    async fn request_transfer_url(
        &self,
        task_id: &str,
        direction: TransferDirection,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<CapabilityUrl, ClientError>;

    /// Reports the terminal status of a held task
    async fn report_result(&self, task_id: &str, outcome: &TaskOutcome) -> Result<(), ClientError>;

    /// Extends the lease of a held task
    async fn heartbeat(
        &self,
        task_id: &str,
        worker_id: &str,
        extend_by: Duration,
    ) -> Result<Option<DateTime<Utc>>, ClientError>;
}

#[async_trait]
impl TaskRepository for ControlPlaneClient {
    async fn poll_next_task(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Task>, ClientError> {
        ControlPlaneClient::poll_next_task(self, worker_id, lease_duration).await
    }

    async fn request_transfer_url(
        &self,
        task_id: &str,
        direction: TransferDirection,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<CapabilityUrl, ClientError> {
        ControlPlaneClient::request_transfer_url(self, task_id, direction, content_type, filename)
            .await
    }

    async fn report_result(&self, task_id: &str, outcome: &TaskOutcome) -> Result<(), ClientError> {
        ControlPlaneClient::report_result(self, task_id, outcome).await
    }

    async fn heartbeat(
        &self,
        task_id: &str,
        worker_id: &str,
        extend_by: Duration,
    ) -> Result<Option<DateTime<Utc>>, ClientError> {
        ControlPlaneClient::heartbeat(self, task_id, worker_id, extend_by).await
    }
}
