use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::detection::{DetectionStatus, DetectionSummary};
use crate::models::job::{ArtifactRecord, Job, MediaKind, NewJob, ProcessingStatus, TerminalUpdate};
use crate::services::job_store::{JobStore, StoreError};

const JOB_COLUMNS: &str = r#"
    id, owner_ref, media_kind, original_name, mime_type, size_bytes,
    processing_status, detection_status, detection_summary,
    annotated_artifact_ref, artifact_content_type, error, created_at, updated_at
"#;

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_enum<T: FromStr>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|_| StoreError::Corrupt(format!("{column} = {raw:?}")))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let summary: Option<Json<DetectionSummary>> = row.try_get("detection_summary")?;
    let artifact_key: Option<String> = row.try_get("annotated_artifact_ref")?;

    Ok(Job {
        id: row.try_get("id")?,
        owner_ref: row.try_get("owner_ref")?,
        media_kind: parse_enum::<MediaKind>(row, "media_kind")?,
        original_name: row.try_get("original_name")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: row.try_get("size_bytes")?,
        processing_status: parse_enum::<ProcessingStatus>(row, "processing_status")?,
        detection_status: parse_enum::<DetectionStatus>(row, "detection_status")?,
        detection_summary: summary.map(|Json(s)| s),
        artifact: match artifact_key {
            Some(key) => Some(ArtifactRecord {
                key,
                content_type: row.try_get("artifact_content_type")?,
            }),
            None => None,
        },
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO prediction_jobs
                (id, owner_ref, media_kind, original_name, mime_type, size_bytes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(new_job.owner_ref)
        .bind(new_job.media_kind.to_string())
        .bind(new_job.original_name)
        .bind(new_job.mime_type)
        .bind(new_job.size_bytes)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM prediction_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_terminal(&self, id: Uuid, update: TerminalUpdate) -> Result<Job, StoreError> {
        let status = update.status();
        let (detection_status, summary, artifact, error) = match update {
            TerminalUpdate::Completed { detection, artifact } => (
                Some(
                    detection
                        .as_ref()
                        .map(DetectionSummary::detection_status)
                        .unwrap_or(DetectionStatus::Unknown)
                        .to_string(),
                ),
                detection.map(Json),
                Some(artifact),
                None,
            ),
            TerminalUpdate::Failed { error } => (None, None, None, Some(error)),
        };
        let (artifact_key, content_type) = match artifact {
            Some(a) => (Some(a.key), a.content_type),
            None => (None, None),
        };

        // Single statement: every terminal column changes together, and only
        // while the job is still open.
        let row = sqlx::query(&format!(
            r#"
            UPDATE prediction_jobs
            SET processing_status = $2,
                detection_status = COALESCE($3, detection_status),
                detection_summary = $4,
                annotated_artifact_ref = $5,
                artifact_content_type = $6,
                error = $7,
                updated_at = NOW()
            WHERE id = $1
              AND processing_status IN ('PENDING', 'PROCESSING')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(detection_status)
        .bind(summary)
        .bind(artifact_key)
        .bind(content_type)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return job_from_row(&row);
        }

        let current = sqlx::query("SELECT processing_status FROM prediction_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match current {
            Some(row) => Err(StoreError::AlreadyTerminal {
                id,
                status: parse_enum(&row, "processing_status")?,
            }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM prediction_jobs
            WHERE processing_status IN ('PENDING', 'PROCESSING')
              AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
