use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Domain classification of what the inference service found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStatus {
    Unknown,
    Clean,
    Flagged,
    Error,
}

impl DetectionStatus {
    /// Classify the free-form `overallStatus` string reported by the model.
    pub fn classify(overall_status: &str) -> Self {
        let normalized = overall_status.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "CLEAN" | "NON_VIOLENT" | "NONVIOLENT" | "SAFE" | "NORMAL" => DetectionStatus::Clean,
            "FLAGGED" | "VIOLENT" | "VIOLENCE" | "ANOMALY" | "ANOMALOUS" => {
                DetectionStatus::Flagged
            }
            "ERROR" => DetectionStatus::Error,
            _ => DetectionStatus::Unknown,
        }
    }
}

/// Detection document returned by the video endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    #[garde(length(min = 1, max = 64))]
    pub overall_status: String,

    #[garde(range(min = 0.0, max = 1.0))]
    pub overall_confidence: f64,

    #[serde(rename = "violentFrames")]
    #[garde(skip)]
    pub violent_frame_count: u64,

    #[serde(rename = "totalFrames")]
    #[garde(skip)]
    pub total_frame_count: u64,

    /// Per-frame (or per-segment) entries, passed through verbatim.
    #[serde(rename = "results", default)]
    #[garde(skip)]
    pub per_frame_results: Vec<serde_json::Value>,
}

impl DetectionSummary {
    pub fn detection_status(&self) -> DetectionStatus {
        DetectionStatus::classify(&self.overall_status)
    }
}
