//! Workflow submission: one upload in, one run identifier out.

use crate::client::WorkflowClient;
use crate::error::ForgeError;
use crate::pipeline::encode::encode_document;
use crate::pipeline::input::UploadedInput;
use tracing::{info, warn};

/// Encode `input` and start one workflow run.
///
/// The client already holds validated credentials (see
/// [`WorkflowClient::new`]), so the only failure left here is
/// [`ForgeError::Submission`].
pub async fn submit_run(client: &WorkflowClient, input: &UploadedInput) -> Result<String, ForgeError> {
    let encoded = encode_document(input.bytes());
    info!(
        "Starting workflow run for '{}' ({} bytes)",
        input.original_name(),
        input.len()
    );

    match client.start_run(&encoded).await {
        Ok(run_id) => {
            info!("Workflow started, run id {}", run_id);
            Ok(run_id)
        }
        Err(e) => {
            if e.is_auth_failure() {
                warn!("Workflow API rejected the API token");
            } else {
                warn!("Workflow submission failed: {}", e);
            }
            Err(e)
        }
    }
}
