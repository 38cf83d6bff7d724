//! Data Transfer Objects for the control-plane contract
//!
//! Request and response bodies exchanged with the control plane. Domain
//! types that travel as-is (such as `Task`) are embedded directly.

pub mod report;
pub mod task;
pub mod transfer;

use serde::{Deserialize, Serialize};

/// Response envelope used by the control plane
///
/// `success=true` with `data=null` is a valid, empty answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}
