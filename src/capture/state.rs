use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    #[default]
    Idle,
    Starting,
    Recording,
    Stopping,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum InputMode {
    #[default]
    Upload,
    Camera,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub status: CaptureStatus,
    pub input_mode: InputMode,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub segment_length_secs: u64,
    pub segments_recorded: u64,
    /// Container type negotiated for the current session.
    pub mime_type: Option<String>,
    pub stream_id: Option<String>,
    /// Last fatal error; kept after returning to idle so the UI can show it.
    pub last_error: Option<String>,
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, CaptureStatus::Starting | CaptureStatus::Recording)
    }

    pub fn begin_starting(&mut self, session_id: String, segment_length_secs: u64) {
        self.status = CaptureStatus::Starting;
        self.input_mode = InputMode::Camera;
        self.session_id = Some(session_id);
        self.started_at = Some(Utc::now());
        self.segment_length_secs = segment_length_secs;
        self.segments_recorded = 0;
        self.mime_type = None;
        self.stream_id = None;
        self.last_error = None;
    }

    pub fn begin_recording(&mut self, stream_id: String, mime_type: Option<String>) {
        self.status = CaptureStatus::Recording;
        self.stream_id = Some(stream_id);
        self.mime_type = mime_type;
    }

    pub fn begin_stopping(&mut self) {
        self.status = CaptureStatus::Stopping;
    }

    /// Return to idle. Session counters stay readable until the next start.
    pub fn reset_to_idle(&mut self, error: Option<String>) {
        self.status = CaptureStatus::Idle;
        self.stream_id = None;
        if error.is_some() {
            self.last_error = error;
        }
    }
}
