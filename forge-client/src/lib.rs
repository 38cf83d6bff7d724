//! Forge HTTP Client
//!
//! Typed HTTP operations against the control plane, plus artifact transfer
//! through the short-lived capability URLs it issues.
//!
//! Two clients live here:
//! - [`ControlPlaneClient`]: request-next-task, request-transfer-url,
//!   report-result and heartbeat. Every request carries the worker's bearer
//!   token and is bounded by a request timeout. Nothing is retried here;
//!   retry policy belongs to the caller.
//! - [`ArtifactClient`]: streams artifacts to and from capability URLs. It
//!   never sends the bearer token.
//!
//! # Example
//!
//! ```no_run
//! use forge_client::ControlPlaneClient;
//! use secrecy::SecretString;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let token = SecretString::from("worker-token");
//!     let client = ControlPlaneClient::new("https://app.example.com/api", &token, Duration::from_secs(30))?;
//!
//!     if let Some(task) = client.poll_next_task("gpu-01", Duration::from_secs(600)).await? {
//!         println!("Claimed task: {}", task.item_id);
//!     }
//!     Ok(())
//! }
//! ```

mod artifacts;
pub mod error;
mod tasks;
mod transfer;

// Re-export commonly used types
pub use artifacts::ArtifactClient;
pub use error::{ClientError, Result, TransferError};
pub use forge_core::domain::task::{Task, TaskOutcome};
pub use forge_core::domain::transfer::{CapabilityUrl, TransferDirection};

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::truncate_body;

const USER_AGENT: &str = concat!("forge-worker/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the control-plane worker API
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// Base URL of the control plane (e.g., "https://app.example.com/api")
    base_url: String,
    /// HTTP client instance, with the bearer token installed as a default header
    client: Client,
}

impl ControlPlaneClient {
    /// Create a new control-plane client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the worker API
    /// * `token` - Bearer credential attached to every request
    /// * `timeout` - Upper bound for each request
    pub fn new(base_url: impl Into<String>, token: &SecretString, timeout: Duration) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| {
                ClientError::InvalidRequest("worker token contains invalid characters".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self::with_client(base_url, client))
    }

    /// Create a new control-plane client with a custom HTTP client
    ///
    /// The caller is responsible for installing authentication on `client`.
    ///
    /// # Example
    /// ```
    /// use forge_client::ControlPlaneClient;
    /// use reqwest::Client;
    ///
    /// let client = ControlPlaneClient::with_client("http://localhost:3000/api", Client::new());
    /// assert_eq!(client.base_url(), "http://localhost:3000/api");
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the control plane
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/worker/{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    ///
    /// Non-success statuses become [`ClientError::Api`]; bodies that do not
    /// match `T` become [`ClientError::Protocol`].
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let body = self.handle_text_response(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            ClientError::Protocol(format!(
                "unexpected response body ({}): {}",
                e,
                truncate_body(&body)
            ))
        })
    }

    /// Check the status code and return the raw body, which may be empty
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                truncate_body(&error_text),
            ));
        }

        Ok(response.text().await?)
    }

    /// Check the status code of a response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.handle_text_response(response).await.map(|_| ())
    }
}
