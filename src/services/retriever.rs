use std::sync::Arc;

use uuid::Uuid;

use crate::models::job::{MediaKind, ProcessingStatus};
use crate::services::artifacts::{sanitize_file_name, ArtifactError, ArtifactStore, ArtifactStream};
use crate::services::job_store::{JobStore, StoreError};

/// Everything the boundary layer needs to stream an artifact back.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    pub job_id: Uuid,
    pub media_kind: MediaKind,
    pub key: String,
    pub content_type: Option<String>,
    /// Header-safe download name.
    pub file_name: String,
}

/// Looks up completed jobs and opens their annotated output.
pub struct ArtifactRetriever {
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ArtifactRetriever {
    pub fn new(store: Arc<dyn JobStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    pub async fn fetch(&self, id: Uuid) -> Result<ArtifactHandle, RetrievalError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(RetrievalError::NotFound(id))?;

        match (job.processing_status, job.artifact) {
            (ProcessingStatus::Completed, Some(artifact)) => Ok(ArtifactHandle {
                job_id: job.id,
                media_kind: job.media_kind,
                key: artifact.key,
                content_type: artifact.content_type,
                file_name: format!("annotated_{}", sanitize_file_name(&job.original_name)),
            }),
            (status, _) => Err(RetrievalError::NotReady { id, status }),
        }
    }

    pub async fn open(&self, handle: &ArtifactHandle) -> Result<ArtifactStream, RetrievalError> {
        Ok(self.artifacts.open(&handle.key).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {id} has no artifact (status {status})")]
    NotReady { id: Uuid, status: ProcessingStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
