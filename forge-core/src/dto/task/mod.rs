//! Task DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request for the next available task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTaskRequest {
    pub worker_id: String,
    pub lease_duration_seconds: u64,
}

/// Request to extend the lease of a held task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub task_id: String,
    pub worker_id: String,
    pub extend_seconds: u64,
}

/// Payload of a heartbeat acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatAck {
    #[serde(default)]
    pub leased_until: Option<DateTime<Utc>>,
}
