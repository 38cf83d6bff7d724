//! Task lifecycle endpoints

use chrono::{DateTime, Utc};
use forge_core::domain::task::{Task, TaskOutcome};
use forge_core::dto::Envelope;
use forge_core::dto::report::ReportRequest;
use forge_core::dto::task::{HeartbeatAck, HeartbeatRequest, NextTaskRequest};
use std::time::Duration;
use tracing::debug;

use crate::ControlPlaneClient;
use crate::error::{ClientError, Result};

impl ControlPlaneClient {
    // =============================================================================
    // Task Lifecycle
    // =============================================================================

    /// Ask for at most one task and a lease on it
    ///
    /// # Arguments
    /// * `worker_id` - Identity of the polling worker
    /// * `lease_duration` - Requested lease length
    ///
    /// # Returns
    /// `None` when the control plane has no work (`success=true, data=null`)
    pub async fn poll_next_task(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Task>> {
        let url = self.endpoint("next-task");
        let response = self
            .client
            .post(&url)
            .json(&NextTaskRequest {
                worker_id: worker_id.to_string(),
                lease_duration_seconds: lease_duration.as_secs(),
            })
            .send()
            .await?;

        let envelope: Envelope<Task> = self.handle_response(response).await?;
        if !envelope.success {
            return Err(ClientError::Protocol(format!(
                "next-task returned success=false: {}",
                envelope.error.as_deref().unwrap_or("no error message")
            )));
        }

        debug!(claimed = envelope.data.is_some(), "Poll completed");
        Ok(envelope.data)
    }

    /// Report the terminal status of a task
    ///
    /// Called at most once per task by the worker. The acknowledgement body
    /// is not inspected; any success status counts.
    pub async fn report_result(&self, task_id: &str, outcome: &TaskOutcome) -> Result<()> {
        let url = self.endpoint("report");
        let response = self
            .client
            .post(&url)
            .json(&ReportRequest::new(task_id, outcome))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Ask the control plane to extend the lease on a held task
    ///
    /// Any success status is an acknowledgement. The body is read only for
    /// an optional `leased_until`; bodies in another shape are ignored.
    ///
    /// # Returns
    /// The new lease expiry when the control plane reports one
    pub async fn heartbeat(
        &self,
        task_id: &str,
        worker_id: &str,
        extend_by: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        let url = self.endpoint("heartbeat");
        let response = self
            .client
            .post(&url)
            .json(&HeartbeatRequest {
                task_id: task_id.to_string(),
                worker_id: worker_id.to_string(),
                extend_seconds: extend_by.as_secs(),
            })
            .send()
            .await?;

        let body = self.handle_text_response(response).await?;
        let Ok(envelope) = serde_json::from_str::<Envelope<HeartbeatAck>>(&body) else {
            debug!(task_id = %task_id, "Heartbeat acknowledged without lease expiry");
            return Ok(None);
        };
        if !envelope.success {
            return Err(ClientError::Protocol(format!(
                "heartbeat rejected: {}",
                envelope.error.as_deref().unwrap_or("no error message")
            )));
        }

        Ok(envelope.data.and_then(|ack| ack.leased_until))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use secrecy::SecretString;

    fn client_for(server: &Server) -> ControlPlaneClient {
        let token = SecretString::from("test-token");
        ControlPlaneClient::new(server.url(), &token, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_poll_returns_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/worker/next-task")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(serde_json::json!({
                "worker_id": "gpu-01",
                "lease_duration_seconds": 600
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "success": true,
                    "data": {
                        "item_id": "item-1",
                        "group_id": "group-1",
                        "photo_id": "photo-1",
                        "photo_storage_path": "uploads/photo.png",
                        "prompt": "slow zoom",
                        "frame_num": 81,
                        "leased_until": "2026-10-18T12:10:00Z"
                    }
                }"#,
            )
            .expect(1)
            .create_async()
            .await;

        let task = client_for(&server)
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap()
            .expect("task should be returned");

        mock.assert_async().await;
        assert_eq!(task.item_id, "item-1");
        assert_eq!(task.frame_count, Some(81));
    }

    #[tokio::test]
    async fn test_poll_without_work_returns_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/next-task")
            .with_status(200)
            .with_body(r#"{"success": true, "data": null}"#)
            .create_async()
            .await;

        let task = client_for(&server)
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap();
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn test_poll_malformed_envelope_is_protocol_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/next-task")
            .with_status(200)
            .with_body(r#"{"task": {"id": 1}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_poll_unsuccessful_envelope_is_protocol_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/next-task")
            .with_status(200)
            .with_body(r#"{"success": false, "data": null, "error": "queue locked"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref msg) if msg.contains("queue locked")));
    }

    #[tokio::test]
    async fn test_poll_server_error_is_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/next-task")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = client_for(&server)
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_poll_unreachable_is_transport_error() {
        let token = SecretString::from("test-token");
        // Port 9 (discard) on localhost is not expected to accept connections.
        let client =
            ControlPlaneClient::new("http://127.0.0.1:9", &token, Duration::from_secs(2)).unwrap();

        let err = client
            .poll_next_task("gpu-01", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_report_done() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/worker/report")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(serde_json::json!({
                "task_id": "item-1",
                "status": "done",
                "output_path": "videos/item-1.mp4"
            })))
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .expect(1)
            .create_async()
            .await;

        client_for(&server)
            .report_result("item-1", &TaskOutcome::done("videos/item-1.mp4"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_report_failure_status_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/report")
            .with_status(409)
            .with_body("lease expired")
            .create_async()
            .await;

        let err = client_for(&server)
            .report_result("item-1", &TaskOutcome::failed("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 409, ref message } if message == "lease expired"));
    }

    #[tokio::test]
    async fn test_heartbeat_returns_new_expiry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/worker/heartbeat")
            .match_body(Matcher::Json(serde_json::json!({
                "task_id": "item-1",
                "worker_id": "gpu-01",
                "extend_seconds": 300
            })))
            .with_status(200)
            .with_body(r#"{"success": true, "data": {"leased_until": "2026-10-18T12:15:00Z"}}"#)
            .create_async()
            .await;

        let leased_until = client_for(&server)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            leased_until.map(|t| t.to_rfc3339()),
            Some("2026-10-18T12:15:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_heartbeat_without_expiry() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/heartbeat")
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let leased_until = client_for(&server)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(leased_until.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_accepts_bare_acknowledgement() {
        let mut server = Server::new_async().await;
        let _empty = server
            .mock("POST", "/worker/heartbeat")
            .with_status(200)
            .create_async()
            .await;

        let leased_until = client_for(&server)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(leased_until.is_none());

        let mut other = Server::new_async().await;
        let _other_shape = other
            .mock("POST", "/worker/heartbeat")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let leased_until = client_for(&other)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(leased_until.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_explicit_rejection_is_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/heartbeat")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "lease lost"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref m) if m.contains("lease lost")));
    }

    #[tokio::test]
    async fn test_heartbeat_error_status_is_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/worker/heartbeat")
            .with_status(409)
            .with_body("not the lease owner")
            .create_async()
            .await;

        let err = client_for(&server)
            .heartbeat("item-1", "gpu-01", Duration::from_secs(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 409, .. }));
    }
}
