use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::detection::{DetectionStatus, DetectionSummary};

/// Kind of media submitted for prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Lowercase path segment used in routes and artifact keys.
    pub fn path_segment(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Processing status of a prediction job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

/// Where the annotated output of a completed job lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRecord {
    /// Key in the artifact store.
    pub key: String,
    pub content_type: Option<String>,
}

/// A prediction job: one submission and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_ref: Option<String>,
    pub media_kind: MediaKind,
    pub original_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub processing_status: ProcessingStatus,
    pub detection_status: DetectionStatus,
    pub detection_summary: Option<DetectionSummary>,
    /// Set together with the terminal COMPLETED transition.
    pub artifact: Option<ArtifactRecord>,
    /// Internal failure reason, only on FAILED jobs.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh PENDING job.
    pub fn pending(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_ref: new_job.owner_ref,
            media_kind: new_job.media_kind,
            original_name: new_job.original_name,
            mime_type: new_job.mime_type,
            size_bytes: new_job.size_bytes,
            processing_status: ProcessingStatus::Pending,
            detection_status: DetectionStatus::Unknown,
            detection_summary: None,
            artifact: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal update in place. All terminal fields change together.
    pub fn apply_terminal(&mut self, update: TerminalUpdate) {
        match update {
            TerminalUpdate::Completed { detection, artifact } => {
                self.processing_status = ProcessingStatus::Completed;
                self.detection_status = detection
                    .as_ref()
                    .map(DetectionSummary::detection_status)
                    .unwrap_or(DetectionStatus::Unknown);
                self.detection_summary = detection;
                self.artifact = Some(artifact);
                self.error = None;
            }
            TerminalUpdate::Failed { error } => {
                self.processing_status = ProcessingStatus::Failed;
                self.detection_summary = None;
                self.artifact = None;
                self.error = Some(error);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Fields supplied when a job is created at ingress.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_ref: Option<String>,
    pub media_kind: MediaKind,
    pub original_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
}

/// The single transition a job makes out of PENDING/PROCESSING.
#[derive(Debug, Clone)]
pub enum TerminalUpdate {
    Completed {
        detection: Option<DetectionSummary>,
        artifact: ArtifactRecord,
    },
    Failed {
        error: String,
    },
}

impl TerminalUpdate {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            TerminalUpdate::Completed { .. } => ProcessingStatus::Completed,
            TerminalUpdate::Failed { .. } => ProcessingStatus::Failed,
        }
    }
}
