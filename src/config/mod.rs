use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Inference endpoint for video uploads
    pub predict_video_api: String,

    /// Inference endpoint for image uploads
    pub predict_image_api: String,

    /// PostgreSQL connection string. Jobs are kept in memory when unset.
    pub database_url: Option<String>,

    /// Upper bound on a single inference call
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,

    /// Request body limit for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Local directory for annotated artifacts
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    /// R2 bucket name
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// Open jobs older than this are failed by reconciliation
    #[serde(default = "default_stale_job_secs")]
    pub stale_job_secs: u64,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

/// Credentials for the R2 artifact backend.
#[derive(Debug, Clone, PartialEq)]
pub struct R2Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactBackend {
    Local(String),
    R2(R2Settings),
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    120
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_artifacts_dir() -> String {
    "./uploads".to_string()
}

fn default_stale_job_secs() -> u64 {
    900
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks not expressible as serde defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A job is still legitimately open while its relay call runs.
        if self.stale_job_secs <= self.relay_timeout_secs {
            return Err(ConfigError::StaleBeforeTimeout {
                stale_job_secs: self.stale_job_secs,
                relay_timeout_secs: self.relay_timeout_secs,
            });
        }
        self.artifact_backend()?;
        Ok(())
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_job_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    /// R2 when all four R2 settings are present, the local directory when none are.
    pub fn artifact_backend(&self) -> Result<ArtifactBackend, ConfigError> {
        match (
            &self.r2_bucket,
            &self.r2_endpoint,
            &self.r2_access_key,
            &self.r2_secret_key,
        ) {
            (None, None, None, None) => Ok(ArtifactBackend::Local(self.artifacts_dir.clone())),
            (Some(bucket), Some(endpoint), Some(access_key), Some(secret_key)) => {
                Ok(ArtifactBackend::R2(R2Settings {
                    bucket: bucket.clone(),
                    endpoint: endpoint.clone(),
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                }))
            }
            _ => Err(ConfigError::PartialR2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("R2_BUCKET, R2_ENDPOINT, R2_ACCESS_KEY and R2_SECRET_KEY must be set together")]
    PartialR2,

    #[error(
        "STALE_JOB_SECS ({stale_job_secs}) must exceed RELAY_TIMEOUT_SECS ({relay_timeout_secs})"
    )]
    StaleBeforeTimeout {
        stale_job_secs: u64,
        relay_timeout_secs: u64,
    },
}
