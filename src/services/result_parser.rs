use garde::Validate;

use crate::models::detection::DetectionSummary;
use crate::models::job::MediaKind;
use crate::services::relay::RelayResponse;

/// Response header carrying the JSON detection document for videos.
pub const DETECTION_HEADER: &str = "x-detection-results";

/// Extract the detection summary from a relay response.
///
/// Images carry no structured metadata and always yield `None`.
pub fn parse(
    response: &RelayResponse,
    media_kind: MediaKind,
) -> Result<Option<DetectionSummary>, ParseError> {
    match media_kind {
        MediaKind::Image => Ok(None),
        MediaKind::Video => parse_detection_header(response).map(Some),
    }
}

fn parse_detection_header(response: &RelayResponse) -> Result<DetectionSummary, ParseError> {
    let raw = response
        .headers
        .get(DETECTION_HEADER)
        .ok_or(ParseError::MissingHeader)?
        .to_str()
        .map_err(|_| ParseError::InvalidEncoding)?;

    let summary: DetectionSummary = serde_json::from_str(raw).map_err(ParseError::Json)?;

    summary
        .validate()
        .map_err(|e| ParseError::Invalid(e.to_string()))?;

    if summary.violent_frame_count > summary.total_frame_count {
        return Err(ParseError::Invalid(format!(
            "violentFrames ({}) exceeds totalFrames ({})",
            summary.violent_frame_count, summary.total_frame_count
        )));
    }

    Ok(summary)
}

/// The detection document is absent or unusable.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed metadata: missing x-detection-results header")]
    MissingHeader,

    #[error("malformed metadata: x-detection-results header is not visible ASCII")]
    InvalidEncoding,

    #[error("malformed metadata: invalid detection JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("malformed metadata: {0}")]
    Invalid(String),
}
