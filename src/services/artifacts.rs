use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::models::job::MediaKind;

/// Byte stream of a stored artifact.
pub type ArtifactStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Addressable storage for annotated outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>)
        -> Result<(), ArtifactError>;

    async fn open(&self, key: &str) -> Result<ArtifactStream, ArtifactError>;

    async fn delete(&self, key: &str) -> Result<(), ArtifactError>;
}

/// Storage key for a job's annotated output.
pub fn artifact_key(kind: MediaKind, job_id: Uuid, original_name: &str) -> String {
    format!(
        "{}/{}/annotated_{}",
        kind.path_segment(),
        job_id,
        sanitize_file_name(original_name)
    )
}

/// Keep letters, digits, `-`, `_` and `.`; collapse anything else to `_`.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Artifacts on the local filesystem under a root directory.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temp file then rename so readers never see a partial file.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn open(&self, key: &str) -> Result<ArtifactStream, ArtifactError> {
        let path = self.resolve(key)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArtifactError::Missing(key.to_string()),
            _ => ArtifactError::Io(e),
        })?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn delete(&self, key: &str) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactError::Io(e)),
        }
    }
}

/// Artifacts in Cloudflare R2 (S3-compatible).
pub struct R2ArtifactStore {
    bucket: Box<Bucket>,
}

impl R2ArtifactStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, ArtifactError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| ArtifactError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| ArtifactError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }
}

/// Adapt a backend chunk stream, surfacing backend errors as I/O errors.
fn into_artifact_stream<S, E>(chunks: S) -> ArtifactStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    chunks.map(|chunk| chunk.map_err(io::Error::other)).boxed()
}

fn check_status(key: &str, code: u16) -> Result<(), ArtifactError> {
    match code {
        200..=299 => Ok(()),
        404 => Err(ArtifactError::Missing(key.to_string())),
        other => Err(ArtifactError::Status(other)),
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), ArtifactError> {
        let response = self
            .bucket
            .put_object_with_content_type(
                key,
                &data,
                content_type.unwrap_or("application/octet-stream"),
            )
            .await?;
        check_status(key, response.status_code())
    }

    async fn open(&self, key: &str) -> Result<ArtifactStream, ArtifactError> {
        let response = self.bucket.get_object_stream(key).await?;
        check_status(key, response.status_code)?;
        Ok(into_artifact_stream(response.bytes))
    }

    async fn delete(&self, key: &str) -> Result<(), ArtifactError> {
        let response = self.bucket.delete_object(key).await?;
        match check_status(key, response.status_code()) {
            Err(ArtifactError::Missing(_)) => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact {0} not found")]
    Missing(String),

    #[error("invalid artifact key {0:?}")]
    InvalidKey(String),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned status {0}")]
    Status(u16),

    #[error("storage configuration error: {0}")]
    Config(String),
}
