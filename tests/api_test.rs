//! HTTP surface exercised through the router.

mod helpers;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use helpers::*;
use predict_gateway::models::job::{MediaKind, NewJob, ProcessingStatus, TerminalUpdate};
use predict_gateway::models::prediction::{JobStatusResponse, VideoPredictionResponse};
use predict_gateway::routes;
use predict_gateway::services::job_store::JobStore;

const BOUNDARY: &str = "predict-gateway-test-boundary";

fn multipart_body(file: Option<(&str, &[u8])>, user_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(user_id) = user_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"userId\"\r\n\r\n{user_id}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(uri: &str, file: Option<(&str, &[u8])>, user_id: Option<&str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(file, user_id)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn health_check_reports_ok() {
    let env = test_env(&closed_endpoint().await);
    let app = routes::router(env.state.clone());

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn video_prediction_returns_summary_and_serves_artifact() {
    let base_url = spawn_inference(MockReply::video(CLEAN_DOCUMENT)).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let response = send(
        &app,
        upload("/predict/video", Some(("clip.mp4", b"video bytes".as_slice())), Some("user123")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-detection-status"), Some("CLEAN"));
    let upload_id = header(&response, "x-upload-id").unwrap().to_string();

    let body: VideoPredictionResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.job_id.to_string(), upload_id);
    assert_eq!(body.video_url, format!("/predict/video/{upload_id}"));
    assert_eq!(body.overall_status, "CLEAN");
    assert_eq!(body.overall_confidence, 0.92);
    assert_eq!(body.violent_frames, 0);
    assert_eq!(body.total_frames, 120);

    let job = env.store.get(body.job_id).await.unwrap().unwrap();
    assert_eq!(job.owner_ref.as_deref(), Some("user123"));

    let artifact = send(&app, get(&body.video_url)).await;
    assert_eq!(artifact.status(), StatusCode::OK);
    assert_eq!(header(&artifact, "content-type"), Some("video/mp4"));
    assert_eq!(body_bytes(artifact).await, b"annotated:video bytes");

    let status = send(&app, get(&format!("/predict/jobs/{upload_id}"))).await;
    assert_eq!(status.status(), StatusCode::OK);
    let status: JobStatusResponse = serde_json::from_slice(&body_bytes(status).await).unwrap();
    assert_eq!(status.processing_status, ProcessingStatus::Completed);
    assert_eq!(status.artifact_url, Some(body.video_url));
}

#[tokio::test]
async fn missing_file_is_bad_request() {
    let env = test_env(&closed_endpoint().await);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/video", None, Some("user123"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.store.is_empty());
}

#[tokio::test]
async fn empty_file_is_bad_request() {
    let env = test_env(&closed_endpoint().await);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/video", Some(("clip.mp4", b"".as_slice())), None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.store.is_empty());
}

#[tokio::test]
async fn upstream_failure_is_generic_server_error() {
    let base_url = spawn_inference(MockReply::status(500)).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/video", Some(("clip.mp4", b"v".as_slice())), None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"], "Error during prediction");
    assert_eq!(env.store.len(), 1);
}

#[tokio::test]
async fn image_prediction_passes_content_headers_through() {
    let reply = MockReply::ok().header("content-type", "image/png");
    let base_url = spawn_inference(reply).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/image", Some(("cat.png", PNG_BYTES)), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert_eq!(
        header(&response, "content-disposition"),
        Some("attachment; filename=annotated_cat.png")
    );
    let upload_id: Uuid = header(&response, "x-upload-id").unwrap().parse().unwrap();

    let mut expected = b"annotated:".to_vec();
    expected.extend_from_slice(PNG_BYTES);
    assert_eq!(body_bytes(response).await, expected);

    let artifact = send(&app, get(&format!("/predict/image/{upload_id}"))).await;
    assert_eq!(artifact.status(), StatusCode::OK);
    assert_eq!(body_bytes(artifact).await, expected);
}

#[tokio::test]
async fn image_prediction_rejects_unknown_format() {
    let env = test_env(&closed_endpoint().await);
    let app = routes::router(env.state.clone());

    let response = send(
        &app,
        upload("/predict/image", Some(("notes.txt", b"plain text, not an image".as_slice())), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(env.store.is_empty());
}

#[tokio::test]
async fn artifact_lookup_maps_not_found_and_not_ready() {
    let env = test_env(&closed_endpoint().await);
    let app = routes::router(env.state.clone());

    let response = send(&app, get(&format!("/predict/video/{}", Uuid::new_v4()))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let job = env
        .store
        .create(NewJob {
            owner_ref: None,
            media_kind: MediaKind::Video,
            original_name: "clip.mp4".to_string(),
            mime_type: None,
            size_bytes: 1,
        })
        .await
        .unwrap();

    let response = send(&app, get(&format!("/predict/video/{}", job.id))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    env.store
        .update_terminal(
            job.id,
            TerminalUpdate::Failed {
                error: "relay failed".to_string(),
            },
        )
        .await
        .unwrap();
    let response = send(&app, get(&format!("/predict/video/{}", job.id))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(&app, get(&format!("/predict/jobs/{}", Uuid::new_v4()))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn artifact_of_other_media_kind_is_not_found() {
    let base_url = spawn_inference(MockReply::video(CLEAN_DOCUMENT)).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/video", Some(("clip.mp4", b"v".as_slice())), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let upload_id = header(&response, "x-upload-id").unwrap().to_string();

    let response = send(&app, get(&format!("/predict/image/{upload_id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_download_names_are_header_safe() {
    let reply = MockReply::ok().header("content-type", "image/png");
    let base_url = spawn_inference(reply).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let response = send(&app, upload("/predict/image", Some(("my cat,1.png", PNG_BYTES)), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-disposition"),
        Some("attachment; filename=annotated_my_cat_1.png")
    );
    let upload_id: Uuid = header(&response, "x-upload-id").unwrap().parse().unwrap();

    let artifact = send(&app, get(&format!("/predict/image/{upload_id}"))).await;
    assert_eq!(artifact.status(), StatusCode::OK);
    assert_eq!(
        header(&artifact, "content-disposition"),
        Some("inline; filename=\"annotated_my_cat_1.png\"")
    );
}

#[tokio::test]
async fn dropped_request_still_reaches_terminal_state() {
    let reply = MockReply::video(CLEAN_DOCUMENT).delayed(Duration::from_millis(500));
    let base_url = spawn_inference(reply).await;
    let env = test_env(&base_url);
    let app = routes::router(env.state.clone());

    let request = upload("/predict/video", Some(("clip.mp4", b"video bytes".as_slice())), None);
    let client = tokio::spawn(app.clone().oneshot(request));

    // Drop the caller once the job exists and the relay is in flight.
    let mut waited = Duration::ZERO;
    while env.store.is_empty() {
        assert!(waited < Duration::from_secs(5), "job was never created");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    client.abort();
    assert!(client.await.unwrap_err().is_cancelled());

    let job_id = env.store.ids()[0];
    let mut job = env.store.get(job_id).await.unwrap().unwrap();
    for _ in 0..300 {
        if job.processing_status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = env.store.get(job_id).await.unwrap().unwrap();
    }
    assert_eq!(env.store.len(), 1);
    assert_eq!(job.processing_status, ProcessingStatus::Completed);
    assert!(job.artifact.is_some());
}
