use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

/// Form field the inference service reads the upload from.
const FILE_FIELD: &str = "file";

/// Raw response captured from the inference service.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    /// Preserved verbatim for the result parser and for passthrough.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RelayResponse {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Client that forwards uploads to the external inference service.
pub struct BlobRelay {
    http: Client,
}

impl BlobRelay {
    /// Build a relay whose calls are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RelayError::Transport)?;
        Ok(Self { http })
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// POST `body` as a single-file multipart form to `endpoint`.
    pub async fn relay(
        &self,
        endpoint: &str,
        body: Bytes,
        file_name: &str,
    ) -> Result<RelayResponse, RelayError> {
        let length = body.len() as u64;
        let part = Part::stream_with_length(body, length).file_name(file_name.to_string());
        let form = Form::new().part(FILE_FIELD, part);

        let response = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(RelayError::Transport)?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream {
                status,
                body: truncate(body, 512),
            });
        }

        let body = response.bytes().await.map_err(RelayError::Transport)?;

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Connection, timeout, or body read failure.
    #[error("transport error reaching inference service: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("inference service returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },
}

impl RelayError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Transport(_) => "transport",
            RelayError::Upstream { .. } => "upstream",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Transport(e) if e.is_timeout())
    }
}
