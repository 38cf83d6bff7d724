//! Report DTOs

use serde::{Deserialize, Serialize};

use crate::domain::task::{TaskOutcome, TaskStatus};

/// Terminal status report for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportRequest {
    pub fn new(task_id: impl Into<String>, outcome: &TaskOutcome) -> Self {
        let (output_path, error) = match outcome {
            TaskOutcome::Done { output_path } => (Some(output_path.clone()), None),
            TaskOutcome::Failed { error } => (None, Some(error.clone())),
        };

        Self {
            task_id: task_id.into(),
            status: outcome.status(),
            output_path,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_report_shape() {
        let body = serde_json::to_value(ReportRequest::new(
            "item-1",
            &TaskOutcome::done("videos/item-1.mp4"),
        ))
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"task_id": "item-1", "status": "done", "output_path": "videos/item-1.mp4"})
        );
    }

    #[test]
    fn test_failed_report_shape() {
        let body = serde_json::to_value(ReportRequest::new(
            "item-1",
            &TaskOutcome::failed("frame_num must be 4n+1, got 100"),
        ))
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"task_id": "item-1", "status": "failed", "error": "frame_num must be 4n+1, got 100"})
        );
    }
}
