//! Video segment data model.
//!
//! A segment is one bounded slice of camera footage or one uploaded file.
//! Both are treated identically once they reach the submission client.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a segment came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SegmentSource {
    /// Produced by the live capture loop; `sequence` starts at 1 per session.
    Camera { sequence: u64 },
    Upload,
}

/// Immutable video payload. Cloning shares the byte buffer.
#[derive(Debug, Clone)]
pub struct VideoSegment {
    pub id: String,
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    pub source_name: String,
    pub source: SegmentSource,
    /// Capture session that produced the segment; `None` for uploads.
    pub session_id: Option<String>,
}

impl VideoSegment {
    pub fn from_camera(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        captured_at: DateTime<Utc>,
        session_id: &str,
        sequence: u64,
    ) -> Self {
        let mime_type = mime_type.into();
        let source_name = format!(
            "camera-{}-{:04}.{}",
            captured_at.format("%Y%m%dT%H%M%S"),
            sequence,
            extension_for_mime(&mime_type)
        );

        Self {
            id: Uuid::new_v4().to_string(),
            bytes: Arc::from(bytes),
            mime_type,
            captured_at,
            source_name,
            source: SegmentSource::Camera { sequence },
            session_id: Some(session_id.to_string()),
        }
    }

    pub fn from_upload(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bytes: Arc::from(bytes),
            mime_type: mime_type.into(),
            captured_at: Utc::now(),
            source_name: source_name.into(),
            source: SegmentSource::Upload,
            session_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The container part of the MIME type, without codec parameters.
    pub fn container_type(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or(&self.mime_type)
            .trim()
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let container = mime_type.split(';').next().unwrap_or("").trim();
    match container {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        "video/ogg" => "ogv",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn camera_segment_name_carries_sequence_and_extension() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let segment = VideoSegment::from_camera(
            vec![1, 2, 3],
            "video/webm;codecs=vp9,opus",
            at,
            "session-a",
            7,
        );

        assert_eq!(segment.source_name, "camera-20240501T123000-0007.webm");
        assert_eq!(segment.source, SegmentSource::Camera { sequence: 7 });
        assert_eq!(segment.session_id.as_deref(), Some("session-a"));
        assert_eq!(segment.container_type(), "video/webm");
        assert_eq!(segment.len(), 3);
    }

    #[test]
    fn unknown_container_falls_back_to_bin() {
        assert_eq!(extension_for_mime(""), "bin");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
    }
}
