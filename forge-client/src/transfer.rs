//! Capability URL issuance

use forge_core::domain::transfer::{CapabilityUrl, TransferDirection};
use forge_core::dto::transfer::{PresignRequest, PresignResponse};

use crate::ControlPlaneClient;
use crate::error::{ClientError, Result};

impl ControlPlaneClient {
    // =============================================================================
    // Capability URLs
    // =============================================================================

    /// Request a capability URL for one transfer of one task
    ///
    /// # Arguments
    /// * `task_id` - The held task
    /// * `direction` - Download of the input or upload of the output
    /// * `content_type` - MIME type of the artifact to upload
    /// * `filename` - Name the uploaded artifact should be stored under
    ///
    /// Upload URLs must come with the storage path of the output, which is
    /// what the final report refers to.
    pub async fn request_transfer_url(
        &self,
        task_id: &str,
        direction: TransferDirection,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<CapabilityUrl> {
        let url = self.endpoint("presign");
        let response = self
            .client
            .post(&url)
            .json(&PresignRequest {
                task_id: task_id.to_string(),
                direction,
                content_type: content_type.map(str::to_string),
                filename: filename.map(str::to_string),
            })
            .send()
            .await?;

        let presigned: PresignResponse = self.handle_response(response).await?;

        if presigned.url.is_empty() {
            return Err(ClientError::Protocol(format!(
                "presign returned an empty {} URL",
                direction
            )));
        }
        if direction == TransferDirection::UploadOutput && presigned.output_path.is_none() {
            return Err(ClientError::Protocol(
                "presign for upload_output is missing output_path".to_string(),
            ));
        }

        Ok(presigned.into_capability(direction))
    }
}
