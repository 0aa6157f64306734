//! Prediction result data model.
//!
//! A `PredictionResult` is one row of the result store. It is created once
//! when a submission finishes (successfully or not) and never mutated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::segment::{SegmentSource, VideoSegment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Deceptive,
    Truthful,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Deceptive => "Deceptive",
            Verdict::Truthful => "Truthful",
            Verdict::Failed => "Failed",
        }
    }

    /// Accepts the labels the service has been seen to send, including the
    /// short "Truth" form.
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deceptive" | "lie" => Some(Verdict::Deceptive),
            "truthful" | "truth" => Some(Verdict::Truthful),
            "failed" => Some(Verdict::Failed),
            _ => None,
        }
    }
}

/// One emotion reading. Values are percentages and need not sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Emotion {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidencePoint {
    pub time: String,
    pub confidence: f64,
}

/// Decoded visualization image returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    /// Base64 PNG exactly as received, so the front-end can inline it.
    pub png_base64: String,
    pub width: u32,
    pub height: u32,
}

/// Source bytes kept alongside a result for later preview.
#[derive(Debug, Clone)]
pub struct SourceBlob {
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
}

impl From<&VideoSegment> for SourceBlob {
    fn from(segment: &VideoSegment) -> Self {
        Self {
            bytes: Arc::clone(&segment.bytes),
            mime_type: segment.mime_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub id: String,
    /// Completion time of the request.
    pub time: DateTime<Utc>,
    /// Capture time of the source segment.
    pub captured_at: DateTime<Utc>,
    pub result: Verdict,
    /// Percentage 0-100; absent for failures.
    pub confidence: Option<u8>,
    pub video_name: String,
    pub source: SegmentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<Emotion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confidence_timeline: Vec<ConfidencePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
    #[serde(skip)]
    pub source_blob: Option<SourceBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    pub fn failed(segment: &VideoSegment, error: impl Into<String>) -> Self {
        Self {
            id: segment.id.clone(),
            time: Utc::now(),
            captured_at: segment.captured_at,
            result: Verdict::Failed,
            confidence: None,
            video_name: segment.source_name.clone(),
            source: segment.source,
            session_id: segment.session_id.clone(),
            emotions: Vec::new(),
            confidence_timeline: Vec::new(),
            visualization: None,
            source_blob: Some(SourceBlob::from(segment)),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.result == Verdict::Failed
    }

    pub fn confidence_label(&self) -> String {
        match self.confidence {
            Some(value) => format!("{value}%"),
            None => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_labels_are_lenient() {
        assert_eq!(Verdict::from_label("Truth"), Some(Verdict::Truthful));
        assert_eq!(Verdict::from_label(" deceptive "), Some(Verdict::Deceptive));
        assert_eq!(Verdict::from_label("maybe"), None);
    }

    #[test]
    fn failed_result_keeps_source_for_preview() {
        let segment = VideoSegment::from_upload(vec![9; 16], "video/mp4", "clip.mp4");
        let result = PredictionResult::failed(&segment, "bad frame");

        assert!(result.is_failed());
        assert_eq!(result.id, segment.id);
        assert_eq!(result.error.as_deref(), Some("bad frame"));
        assert_eq!(result.source_blob.as_ref().map(|b| b.bytes.len()), Some(16));
        assert_eq!(result.confidence_label(), "-");
    }

    #[test]
    fn serialized_row_omits_blob_and_empty_fields() {
        let segment = VideoSegment::from_upload(vec![1], "video/mp4", "clip.mp4");
        let result = PredictionResult::failed(&segment, "boom");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["result"], "Failed");
        assert_eq!(json["videoName"], "clip.mp4");
        assert!(json.get("sourceBlob").is_none());
        assert!(json.get("emotions").is_none());
    }
}
