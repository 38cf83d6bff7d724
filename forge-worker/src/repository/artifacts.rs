//! Artifacts repository
//!
//! Moves artifacts between the local working set and the storage behind
//! capability URLs.

use async_trait::async_trait;
use forge_client::{ArtifactClient, CapabilityUrl, TransferError};
use std::path::Path;

/// Repository trait for artifact transfers
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetches the input artifact into `destination`
    async fn download(&self, url: &CapabilityUrl, destination: &Path) -> Result<u64, TransferError>;

    /// Sends the output artifact at `source`
    async fn upload(&self, url: &CapabilityUrl, source: &Path) -> Result<u64, TransferError>;
}

#[async_trait]
impl ArtifactStore for ArtifactClient {
    async fn download(&self, url: &CapabilityUrl, destination: &Path) -> Result<u64, TransferError> {
        ArtifactClient::download(self, url, destination).await
    }

    async fn upload(&self, url: &CapabilityUrl, source: &Path) -> Result<u64, TransferError> {
        ArtifactClient::upload(self, url, source).await
    }
}
