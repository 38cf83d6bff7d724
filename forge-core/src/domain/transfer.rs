//! Capability URL domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which way a capability URL moves an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    DownloadInput,
    UploadOutput,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::DownloadInput => write!(f, "download_input"),
            TransferDirection::UploadOutput => write!(f, "upload_output"),
        }
    }
}

/// Short-lived, pre-authorized URL for one transfer of one task
///
/// Only ever held for the duration of a single pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub direction: TransferDirection,
    /// Storage path the uploaded artifact will live at (upload URLs only)
    pub output_path: Option<String>,
}

impl CapabilityUrl {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// MIME type for an artifact, derived from its file extension
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
