//! Shared fixtures: a mock inference service and a wired application state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use uuid::Uuid;

use predict_gateway::app_state::AppState;
use predict_gateway::services::artifacts::{ArtifactStore, ArtifactStream, LocalArtifactStore};
use predict_gateway::services::job_store::{InMemoryJobStore, JobStore};
use predict_gateway::services::orchestrator::InferenceEndpoints;
use predict_gateway::services::relay::BlobRelay;

pub const CLEAN_DOCUMENT: &str =
    r#"{"overallStatus":"CLEAN","overallConfidence":0.92,"violentFrames":0,"totalFrames":120,"results":[]}"#;

pub const VIOLENT_DOCUMENT: &str = r#"{"overallStatus":"VIOLENT","overallConfidence":0.87,"violentFrames":30,"totalFrames":120,"results":[{"frame":12,"label":"violence","confidence":0.91}]}"#;

/// Minimal PNG signature, enough for format sniffing.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

/// What the mock inference service answers with.
#[derive(Clone, Default)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub delay: Option<Duration>,
    /// File names received in the `file` form field.
    pub received: Arc<Mutex<Vec<String>>>,
}

impl MockReply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            ..Self::default()
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn video(document: &str) -> Self {
        Self::ok()
            .header("content-type", "video/mp4")
            .header("x-detection-results", document)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// Echoes the uploaded file prefixed with `annotated:`.
async fn handle(State(reply): State<MockReply>, mut multipart: Multipart) -> Response {
    let mut file = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            reply
                .received
                .lock()
                .unwrap()
                .push(field.file_name().unwrap_or_default().to_string());
            file = field.bytes().await.unwrap().to_vec();
        }
    }

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut builder = Response::builder().status(StatusCode::from_u16(reply.status).unwrap());
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let mut body = b"annotated:".to_vec();
    body.extend(file);
    builder.body(Body::from(body)).unwrap()
}

/// Serve the mock on an ephemeral port; returns its base URL.
pub async fn spawn_inference(reply: MockReply) -> String {
    let app = Router::new()
        .route("/video", post(handle))
        .route("/image", post(handle))
        .with_state(reply);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<InMemoryJobStore>,
    pub artifacts: Arc<LocalArtifactStore>,
    pub artifacts_dir: PathBuf,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.artifacts_dir);
    }
}

pub fn endpoints(base_url: &str) -> InferenceEndpoints {
    InferenceEndpoints {
        video: format!("{base_url}/video"),
        image: format!("{base_url}/image"),
    }
}

pub fn temp_artifacts_dir() -> PathBuf {
    std::env::temp_dir().join(format!("predict-gateway-test-{}", Uuid::new_v4()))
}

/// State wired to an in-memory store, a temp artifact dir and `base_url`.
pub fn test_env_with_timeout(base_url: &str, timeout: Duration) -> TestEnv {
    let store = Arc::new(InMemoryJobStore::new());
    let artifacts_dir = temp_artifacts_dir();
    let artifacts = Arc::new(LocalArtifactStore::new(artifacts_dir.clone()));

    let state = AppState::new(
        store.clone() as Arc<dyn JobStore>,
        artifacts.clone() as Arc<dyn ArtifactStore>,
        BlobRelay::new(timeout).unwrap(),
        endpoints(base_url),
    );

    TestEnv {
        state,
        store,
        artifacts,
        artifacts_dir,
    }
}

pub fn test_env(base_url: &str) -> TestEnv {
    test_env_with_timeout(base_url, Duration::from_secs(10))
}

pub async fn collect(mut stream: ArtifactStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}
