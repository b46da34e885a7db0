use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::detection::DetectionStatus;
use crate::models::job::{Job, MediaKind, ProcessingStatus};

/// Response body for a successful video prediction.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPredictionResponse {
    pub job_id: Uuid,
    pub video_url: String,
    pub overall_status: String,
    pub overall_confidence: f64,
    pub violent_frames: u64,
    pub total_frames: u64,
    pub results: Vec<serde_json::Value>,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub media_kind: MediaKind,
    pub processing_status: ProcessingStatus,
    pub detection_status: DetectionStatus,
    pub artifact_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            media_kind: job.media_kind,
            processing_status: job.processing_status,
            detection_status: job.detection_status,
            artifact_url: job
                .artifact
                .as_ref()
                .map(|_| artifact_path(job.media_kind, job.id)),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Public path from which a job's annotated artifact can be fetched.
pub fn artifact_path(kind: MediaKind, job_id: Uuid) -> String {
    format!("/predict/{}/{}", kind.path_segment(), job_id)
}
