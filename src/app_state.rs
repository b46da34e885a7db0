use std::sync::Arc;

use crate::config::{AppConfig, ArtifactBackend, ConfigError};
use crate::db::{self, PgJobStore};
use crate::services::{
    artifacts::{ArtifactError, ArtifactStore, LocalArtifactStore, R2ArtifactStore},
    job_store::{InMemoryJobStore, JobStore},
    orchestrator::{InferenceEndpoints, PredictionOrchestrator},
    relay::{BlobRelay, RelayError},
    retriever::ArtifactRetriever,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub orchestrator: Arc<PredictionOrchestrator>,
    pub retriever: Arc<ArtifactRetriever>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        relay: BlobRelay,
        endpoints: InferenceEndpoints,
    ) -> Self {
        let orchestrator = PredictionOrchestrator::new(
            store.clone(),
            Arc::new(relay),
            artifacts.clone(),
            endpoints,
        );
        let retriever = ArtifactRetriever::new(store.clone(), artifacts.clone());

        Self {
            store,
            artifacts,
            orchestrator: Arc::new(orchestrator),
            retriever: Arc::new(retriever),
        }
    }

    /// Wire every collaborator from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let store = open_job_store(config).await?;
        let artifacts = open_artifact_store(config)?;

        let relay = BlobRelay::new(config.relay_timeout())?;
        let endpoints = InferenceEndpoints {
            video: config.predict_video_api.clone(),
            image: config.predict_image_api.clone(),
        };

        Ok(Self::new(store, artifacts, relay, endpoints))
    }
}

/// Postgres when `DATABASE_URL` is set (migrations applied), memory otherwise.
pub async fn open_job_store(config: &AppConfig) -> Result<Arc<dyn JobStore>, StartupError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL job store");
            let pool = db::init_pool(url).await?;
            tracing::info!("Running database migrations");
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgJobStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            Ok(Arc::new(InMemoryJobStore::new()))
        }
    }
}

pub fn open_artifact_store(config: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StartupError> {
    match config.artifact_backend()? {
        ArtifactBackend::Local(dir) => {
            tracing::info!(artifacts_dir = %dir, "Using local artifact store");
            Ok(Arc::new(LocalArtifactStore::new(dir)))
        }
        ArtifactBackend::R2(r2) => {
            tracing::info!(bucket = %r2.bucket, "Using R2 artifact store");
            Ok(Arc::new(R2ArtifactStore::new(
                &r2.bucket,
                &r2.endpoint,
                &r2.access_key,
                &r2.secret_key,
            )?))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database initialisation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("artifact store initialisation failed: {0}")]
    Artifacts(#[from] ArtifactError),

    #[error("HTTP client initialisation failed: {0}")]
    Relay(#[from] RelayError),
}
