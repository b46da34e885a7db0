use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::MediaKind;
use crate::models::prediction::{JobStatusResponse, VideoPredictionResponse};
use crate::services::artifacts::sanitize_file_name;
use crate::services::orchestrator::{JobResult, PredictionError, Submission};
use crate::services::retriever::RetrievalError;

pub const UPLOAD_ID_HEADER: &str = "x-upload-id";
pub const DETECTION_STATUS_HEADER: &str = "x-detection-status";

/// Failure responses of the prediction API.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType,
    NotFound(&'static str),
    NotReady,
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Invalid file format".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.to_string()),
            ApiError::NotReady => (
                StatusCode::CONFLICT,
                "Prediction has not completed".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            // Details are logged by the orchestrator, not returned.
            PredictionError::PredictionFailed { .. } => ApiError::Internal("Error during prediction"),
            PredictionError::Store(e) => {
                tracing::error!(error = %e, "Job store unavailable");
                ApiError::Internal("Error during prediction")
            }
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::NotFound(_) => ApiError::NotFound("Artifact not found"),
            RetrievalError::NotReady { .. } => ApiError::NotReady,
            RetrievalError::Artifact(e) => {
                tracing::error!(error = %e, "Artifact missing for completed job");
                ApiError::Internal("Artifact unavailable")
            }
            RetrievalError::Store(e) => {
                tracing::error!(error = %e, "Job store unavailable");
                ApiError::Internal("Artifact unavailable")
            }
        }
    }
}

/// File and owner extracted from a multipart upload.
struct Upload {
    bytes: Bytes,
    file_name: String,
    content_type: Option<String>,
    user_id: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file: Option<(Bytes, String, Option<String>)> = None;
    let mut user_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                file = Some((data, file_name, content_type));
            }
            Some("userId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read userId: {e}")))?;
                let text = text.trim();
                if !text.is_empty() {
                    user_id = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let (bytes, file_name, content_type) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    Ok(Upload {
        bytes,
        file_name,
        content_type,
        user_id,
    })
}

/// Run the submission on its own task so a dropped client connection does
/// not cancel the job before it reaches a terminal state.
async fn submit(state: &AppState, kind: MediaKind, upload: Upload) -> Result<JobResult, ApiError> {
    let submission = Submission {
        media_kind: kind,
        file_bytes: upload.bytes,
        original_name: upload.file_name,
        mime_type: upload.content_type,
        owner_ref: upload.user_id,
    };

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move { orchestrator.submit(submission).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Prediction task panicked");
            ApiError::Internal("Error during prediction")
        })?
        .map_err(ApiError::from)
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => tracing::debug!(header = %name, "Dropping non-ASCII header value"),
    }
}

/// POST /predict/video: relay a video and return its detection summary.
pub async fn predict_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let result = submit(&state, MediaKind::Video, upload).await?;

    let detection = result.detection.ok_or(ApiError::Internal("Error during prediction"))?;

    let mut headers = HeaderMap::new();
    insert_header(
        &mut headers,
        HeaderName::from_static(UPLOAD_ID_HEADER),
        &result.job.id.to_string(),
    );
    insert_header(
        &mut headers,
        HeaderName::from_static(DETECTION_STATUS_HEADER),
        &result.job.detection_status.to_string(),
    );

    let body = VideoPredictionResponse {
        job_id: result.job.id,
        video_url: result.artifact_path,
        overall_status: detection.overall_status,
        overall_confidence: detection.overall_confidence,
        violent_frames: detection.violent_frame_count,
        total_frames: detection.total_frame_count,
        results: detection.per_frame_results,
    };

    Ok((headers, Json(body)).into_response())
}

/// POST /predict/image: relay an image and return the annotated bytes.
pub async fn predict_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    image::guess_format(&upload.bytes).map_err(|_| ApiError::UnsupportedMediaType)?;

    let original_name = upload.file_name.clone();
    let result = submit(&state, MediaKind::Image, upload).await?;

    let mut headers = HeaderMap::new();
    insert_header(
        &mut headers,
        CONTENT_TYPE,
        result
            .passthrough
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream"),
    );
    let disposition = result
        .passthrough
        .content_disposition
        .unwrap_or_else(|| {
            format!(
                "attachment; filename=annotated_{}",
                sanitize_file_name(&original_name)
            )
        });
    insert_header(&mut headers, CONTENT_DISPOSITION, &disposition);
    insert_header(
        &mut headers,
        HeaderName::from_static(UPLOAD_ID_HEADER),
        &result.job.id.to_string(),
    );

    Ok((headers, Body::from(result.artifact)).into_response())
}

/// GET /predict/video/{id}: stream the annotated video.
pub async fn get_annotated_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    stream_artifact(&state, MediaKind::Video, id, "Video not found").await
}

/// GET /predict/image/{id}: stream the annotated image.
pub async fn get_annotated_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    stream_artifact(&state, MediaKind::Image, id, "Image not found").await
}

async fn stream_artifact(
    state: &AppState,
    kind: MediaKind,
    id: Uuid,
    not_found: &'static str,
) -> Result<Response, ApiError> {
    let handle = state.retriever.fetch(id).await.map_err(|e| match e {
        RetrievalError::NotFound(_) => ApiError::NotFound(not_found),
        other => ApiError::from(other),
    })?;
    if handle.media_kind != kind {
        return Err(ApiError::NotFound(not_found));
    }

    let stream = state.retriever.open(&handle).await?;

    let default_type = match kind {
        MediaKind::Video => "video/mp4",
        MediaKind::Image => "application/octet-stream",
    };
    let mut headers = HeaderMap::new();
    insert_header(
        &mut headers,
        CONTENT_TYPE,
        handle.content_type.as_deref().unwrap_or(default_type),
    );
    insert_header(
        &mut headers,
        CONTENT_DISPOSITION,
        &format!("inline; filename=\"{}\"", handle.file_name),
    );

    Ok((headers, Body::from_stream(stream)).into_response())
}

/// GET /predict/jobs/{id}: job status document.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .store
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %id, error = %e, "Job lookup failed");
            ApiError::Internal("Job lookup failed")
        })?
        .ok_or(ApiError::NotFound("Job not found"))?;

    Ok(Json(JobStatusResponse::from(&job)))
}
