//! Artifact transfer through capability URLs
//!
//! Both directions stream between the network and a local file, so artifact
//! size is bounded by disk rather than memory. Capability URLs are
//! pre-authorized: no bearer token is sent with these requests.

use chrono::Utc;
use forge_core::domain::transfer::{CapabilityUrl, TransferDirection, content_type_for};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::USER_AGENT;
use crate::error::{TransferError, truncate_body};

/// HTTP client for capability-URL transfers
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    client: Client,
}

impl ArtifactClient {
    /// Create a transfer client whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Stream the artifact behind `url` into `destination`
    ///
    /// # Returns
    /// Number of bytes written
    pub async fn download(&self, url: &CapabilityUrl, destination: &Path) -> Result<u64, TransferError> {
        check_usable(url, TransferDirection::DownloadInput)?;

        let mut response = self.client.get(&url.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        let expected = response.content_length();

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(destination).await?;
        let mut received: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = expected {
            if expected != received {
                return Err(TransferError::Truncated { expected, received });
            }
        }

        debug!(bytes = received, path = %destination.display(), "Download complete");
        Ok(received)
    }

    /// Stream the local file at `source` to `url`
    ///
    /// The content type is derived from the file extension.
    ///
    /// # Returns
    /// Number of bytes sent
    pub async fn upload(&self, url: &CapabilityUrl, source: &Path) -> Result<u64, TransferError> {
        check_usable(url, TransferDirection::UploadOutput)?;

        let metadata = tokio::fs::metadata(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::MissingSource(source.to_path_buf())
            } else {
                TransferError::Io(e)
            }
        })?;
        if !metadata.is_file() {
            return Err(TransferError::MissingSource(source.to_path_buf()));
        }
        let size = metadata.len();

        let file = File::open(source).await?;
        let response = self
            .client
            .put(&url.url)
            .header(CONTENT_TYPE, content_type_for(source))
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        debug!(bytes = size, path = %source.display(), "Upload complete");
        Ok(size)
    }
}

/// Rejects URLs issued for the other direction and URLs past their expiry
fn check_usable(url: &CapabilityUrl, expected: TransferDirection) -> Result<(), TransferError> {
    if url.direction != expected {
        return Err(TransferError::WrongDirection {
            expected,
            actual: url.direction,
        });
    }
    if url.is_expired_at(Utc::now()) {
        return Err(TransferError::Expired {
            expires_at: url.expires_at,
        });
    }
    Ok(())
}
