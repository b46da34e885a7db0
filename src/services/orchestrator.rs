use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use uuid::Uuid;

use crate::models::detection::DetectionSummary;
use crate::models::job::{ArtifactRecord, Job, MediaKind, NewJob, TerminalUpdate};
use crate::models::prediction::artifact_path;
use crate::services::artifacts::{artifact_key, ArtifactError, ArtifactStore};
use crate::services::job_store::{JobStore, StoreError};
use crate::services::relay::{BlobRelay, RelayError, RelayResponse};
use crate::services::result_parser::{self, ParseError};

/// External inference endpoints, one per media kind.
#[derive(Debug, Clone)]
pub struct InferenceEndpoints {
    pub video: String,
    pub image: String,
}

impl InferenceEndpoints {
    pub fn for_kind(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Image => &self.image,
        }
    }
}

/// One upload handed over by the ingress layer.
#[derive(Debug, Clone)]
pub struct Submission {
    pub media_kind: MediaKind,
    pub file_bytes: Bytes,
    pub original_name: String,
    pub mime_type: Option<String>,
    /// Already-authenticated caller identity, if any.
    pub owner_ref: Option<String>,
}

/// Content headers relayed from the inference service to the client.
#[derive(Debug, Clone, Default)]
pub struct Passthrough {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// The job in its COMPLETED state.
    pub job: Job,
    pub detection: Option<DetectionSummary>,
    /// Path from which the artifact can be fetched later.
    pub artifact_path: String,
    /// Annotated bytes as returned by the inference service.
    pub artifact: Bytes,
    pub passthrough: Passthrough,
}

/// Drives a job from creation to a terminal state.
pub struct PredictionOrchestrator {
    store: Arc<dyn JobStore>,
    relay: Arc<BlobRelay>,
    artifacts: Arc<dyn ArtifactStore>,
    endpoints: InferenceEndpoints,
}

impl PredictionOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        relay: Arc<BlobRelay>,
        artifacts: Arc<dyn ArtifactStore>,
        endpoints: InferenceEndpoints,
    ) -> Self {
        Self {
            store,
            relay,
            artifacts,
            endpoints,
        }
    }

    /// Create a job, relay the upload, and record the terminal outcome.
    ///
    /// Every failure after the job exists marks it FAILED (best-effort) and
    /// returns `PredictionFailed`.
    pub async fn submit(&self, submission: Submission) -> Result<JobResult, PredictionError> {
        if submission.file_bytes.is_empty() {
            return Err(PredictionError::InvalidInput("uploaded file is empty".to_string()));
        }

        let kind = submission.media_kind;
        let job = self
            .store
            .create(NewJob {
                owner_ref: submission.owner_ref.clone(),
                media_kind: kind,
                original_name: submission.original_name.clone(),
                mime_type: submission.mime_type.clone(),
                size_bytes: submission.file_bytes.len() as i64,
            })
            .await?;

        metrics::counter!("prediction_jobs_total", "media_kind" => kind.to_string()).increment(1);
        tracing::info!(
            job_id = %job.id,
            media_kind = %kind,
            size_bytes = job.size_bytes,
            "Prediction job created"
        );

        match self.run(&job, submission).await {
            Ok(result) => {
                metrics::counter!("prediction_jobs_completed", "media_kind" => kind.to_string())
                    .increment(1);
                tracing::info!(
                    job_id = %job.id,
                    media_kind = %kind,
                    detection_status = %result.job.detection_status,
                    "Prediction job completed"
                );
                Ok(result)
            }
            Err(cause) => {
                metrics::counter!(
                    "prediction_jobs_failed",
                    "media_kind" => kind.to_string(),
                    "reason" => cause.reason()
                )
                .increment(1);
                tracing::error!(
                    job_id = %job.id,
                    media_kind = %kind,
                    reason = cause.reason(),
                    error = %cause,
                    "Prediction job failed"
                );
                self.mark_failed(job.id, &cause).await;
                Err(PredictionError::PredictionFailed {
                    job_id: job.id,
                    cause,
                })
            }
        }
    }

    async fn run(&self, job: &Job, submission: Submission) -> Result<JobResult, FailureCause> {
        let kind = job.media_kind;
        let endpoint = self.endpoints.for_kind(kind);

        let start = Instant::now();
        let relayed = self
            .relay
            .relay(endpoint, submission.file_bytes, &submission.original_name)
            .await;
        metrics::histogram!("prediction_relay_seconds", "media_kind" => kind.to_string())
            .record(start.elapsed().as_secs_f64());
        let response = relayed?;

        tracing::debug!(
            job_id = %job.id,
            relay_ms = start.elapsed().as_millis() as u64,
            body_bytes = response.body.len(),
            "Inference response received"
        );

        let detection = result_parser::parse(&response, kind)?;
        let passthrough = passthrough_headers(&response);

        let key = artifact_key(kind, job.id, &job.original_name);
        self.artifacts
            .put(&key, response.body.clone(), passthrough.content_type.as_deref())
            .await?;

        let update = TerminalUpdate::Completed {
            detection: detection.clone(),
            artifact: ArtifactRecord {
                key: key.clone(),
                content_type: passthrough.content_type.clone(),
            },
        };

        let completed = match self.store.update_terminal(job.id, update).await {
            Ok(job) => job,
            Err(e) => {
                if let Err(cleanup) = self.artifacts.delete(&key).await {
                    tracing::warn!(job_id = %job.id, error = %cleanup, "Failed to remove orphaned artifact");
                }
                return Err(FailureCause::Store(e));
            }
        };

        Ok(JobResult {
            artifact_path: artifact_path(kind, completed.id),
            job: completed,
            detection,
            artifact: response.body,
            passthrough,
        })
    }

    /// Best-effort FAILED transition. If it cannot be written the job stays
    /// open and is left to reconciliation.
    async fn mark_failed(&self, job_id: Uuid, cause: &FailureCause) {
        let update = TerminalUpdate::Failed {
            error: cause.to_string(),
        };
        match self.store.update_terminal(job_id, update).await {
            Ok(_) => {}
            Err(StoreError::AlreadyTerminal { status, .. }) => {
                tracing::warn!(job_id = %job_id, %status, "Job already terminal, FAILED not recorded");
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    error = %e,
                    "Could not mark job FAILED; leaving it for reconciliation"
                );
            }
        }
    }
}

fn passthrough_headers(response: &RelayResponse) -> Passthrough {
    Passthrough {
        content_type: response.header_str("content-type").map(str::to_string),
        content_disposition: response.header_str("content-disposition").map(str::to_string),
    }
}

/// Which step of a submission failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to store artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("failed to record completion: {0}")]
    Store(#[source] StoreError),
}

impl FailureCause {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FailureCause::Relay(e) if e.is_timeout() => "timeout",
            FailureCause::Relay(e) => e.kind(),
            FailureCause::Parse(_) => "malformed_metadata",
            FailureCause::Artifact(_) => "artifact",
            FailureCause::Store(_) => "store",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("invalid submission: {0}")]
    InvalidInput(String),

    /// The job record itself could not be created.
    #[error("job store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("prediction failed for job {job_id}: {cause}")]
    PredictionFailed {
        job_id: Uuid,
        #[source]
        cause: FailureCause,
    },
}
