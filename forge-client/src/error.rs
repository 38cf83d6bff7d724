//! Error types for the forge client

use chrono::{DateTime, Utc};
use forge_core::domain::transfer::TransferDirection;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for control-plane operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the control plane
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or timeout
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Control plane answered with a non-success status code
    #[error("control plane error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Response had an unexpected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Protocol(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Taxonomy label: `transport` or `protocol`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Api { .. } | Self::Protocol(_) | Self::InvalidRequest(_) => "protocol",
        }
    }
}

/// Errors that can occur while moving an artifact through a capability URL
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("capability URL expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("capability URL is for {actual}, expected {expected}")]
    WrongDirection {
        expected: TransferDirection,
        actual: TransferDirection,
    },

    #[error("transfer rejected with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("transfer failed: {0}")]
    Http(reqwest::Error),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source artifact not found: {}", .0.display())]
    MissingSource(PathBuf),
}

impl From<reqwest::Error> for TransferError {
    // Capability URLs embed their signature; keep it out of messages.
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// Trims a response body so it can be embedded in an error message
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 500;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::api_error(503, "unavailable").is_transient());
        assert!(ClientError::api_error(429, "slow down").is_transient());
        assert!(!ClientError::api_error(409, "not owner").is_transient());
        assert!(!ClientError::Protocol("bad".to_string()).is_transient());
    }

    #[test]
    fn test_kind() {
        assert_eq!(ClientError::api_error(404, "gone").kind(), "protocol");
        assert_eq!(ClientError::Protocol("x".to_string()).kind(), "protocol");
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short  "), "short");
        let long = "x".repeat(600);
        let out = truncate_body(&long);
        assert_eq!(out.len(), 503);
        assert!(out.ends_with("..."));
    }
}
