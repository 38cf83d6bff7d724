//! Task domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit of work claimed by exactly one worker at a time
///
/// Field names follow the control plane's wire format; the Rust names
/// describe what the values are used for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub item_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub photo_id: Option<String>,
    /// Locator of the input artifact in the control plane's storage
    #[serde(rename = "photo_storage_path")]
    pub source_reference: String,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Per-task frame count override, validated before use
    #[serde(rename = "frame_num", default)]
    pub frame_count: Option<i64>,
    /// Absolute time after which the lease is void
    #[serde(rename = "leased_until")]
    pub lease_expiry: DateTime<Utc>,
}

impl Task {
    /// Time left on the lease, or `None` once it has expired
    pub fn lease_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.lease_expiry - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Task lifecycle status as seen by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal result of one pipeline execution
///
/// A `done` report always carries the output reference and a `failed`
/// report always carries an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done { output_path: String },
    Failed { error: String },
}

impl TaskOutcome {
    pub fn done(output_path: impl Into<String>) -> Self {
        Self::Done {
            output_path: output_path.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Status reported to the control plane
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Done { .. } => TaskStatus::Done,
            TaskOutcome::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "item_id": "item-1",
            "group_id": "group-1",
            "photo_id": "photo-1",
            "photo_storage_path": "uploads/group-1/photo.png",
            "prompt": "a cat walking",
            "frame_num": 81,
            "leased_until": "2026-10-18T12:00:00Z"
        })
    }

    #[test]
    fn test_task_from_wire_format() {
        let task: Task = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(task.item_id, "item-1");
        assert_eq!(task.source_reference, "uploads/group-1/photo.png");
        assert_eq!(task.frame_count, Some(81));
        assert_eq!(
            task.lease_expiry,
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_task_null_and_missing_optionals() {
        let mut value = sample_json();
        value["frame_num"] = serde_json::Value::Null;
        value.as_object_mut().unwrap().remove("prompt");
        value.as_object_mut().unwrap().remove("group_id");

        let task: Task = serde_json::from_value(value).unwrap();
        assert_eq!(task.frame_count, None);
        assert_eq!(task.prompt, None);
        assert_eq!(task.group_id, None);
    }

    #[test]
    fn test_task_missing_lease_is_rejected() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("leased_until");
        assert!(serde_json::from_value::<Task>(value).is_err());
    }

    #[test]
    fn test_lease_remaining() {
        let task: Task = serde_json::from_value(sample_json()).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 10, 18, 11, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 1).unwrap();

        assert_eq!(task.lease_remaining(before), Some(Duration::from_secs(60)));
        assert_eq!(task.lease_remaining(after), None);
        assert_eq!(task.lease_remaining(task.lease_expiry), None);
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(TaskOutcome::done("out.mp4").status(), TaskStatus::Done);
        assert_eq!(TaskOutcome::failed("boom").status(), TaskStatus::Failed);
        assert!(TaskOutcome::done("out.mp4").is_success());
        assert_eq!(TaskStatus::Done.to_string(), "done");
    }
}
