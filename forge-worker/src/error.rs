//! Pipeline error type
//!
//! Every failure between "task claimed" and "result reported" ends up as a
//! `TaskError`. Its message is what the control plane receives in a
//! `failed` report.

use chrono::{DateTime, Utc};
use forge_client::{ClientError, TransferError};
use forge_core::params::FrameCountError;
use thiserror::Error;

use crate::service::ComputeError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    InvalidParameter(#[from] FrameCountError),

    #[error(transparent)]
    ControlPlane(#[from] ClientError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("lease expired at {expires_at}")]
    LeaseExpired { expires_at: DateTime<Utc> },

    #[error("worker shutting down before {step}")]
    ShuttingDown { step: &'static str },

    #[error("working set error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Error category written to logs
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::InvalidParameter(_) => "invalid_parameter",
            TaskError::ControlPlane(e) => e.kind(),
            TaskError::Transfer(_) => "transfer",
            TaskError::Compute(_) => "compute",
            TaskError::LeaseExpired { .. } => "lease_expired",
            TaskError::ShuttingDown { .. } => "shutdown",
            TaskError::Workspace(_) => "workspace",
            TaskError::Internal(_) => "internal",
        }
    }

    /// Captured output of the compute process, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            TaskError::Compute(e) => e.diagnostics(),
            _ => None,
        }
    }
}
