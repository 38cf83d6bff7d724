//! Capability URL DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::transfer::{CapabilityUrl, TransferDirection};

/// Request for a capability URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignRequest {
    pub task_id: String,
    #[serde(rename = "type")]
    pub direction: TransferDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Capability URL as issued by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl PresignResponse {
    /// Attaches the direction the URL was requested for
    pub fn into_capability(self, direction: TransferDirection) -> CapabilityUrl {
        CapabilityUrl {
            url: self.url,
            expires_at: self.expires_at,
            direction,
            output_path: self.output_path,
        }
    }
}
