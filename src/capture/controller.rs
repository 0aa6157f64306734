use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Database;
use crate::events::{
    self, ErrorEvent, SharedEventSink, CAPTURE_ERROR, CAPTURE_STATE_CHANGED, SEGMENT_RECORDED,
};
use crate::models::{CaptureSessionRecord, SegmentSource, SessionStatus, VideoSegment};
use crate::settings::CaptureSettings;
use crate::submission::SubmissionClient;

use super::platform::{CaptureConstraints, CaptureError, MediaPlatform, StreamGuard};
use super::recorder::{select_mime_type, RecorderExit, SegmentRecorder};
use super::state::{CaptureState, CaptureStatus, InputMode};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "capture";

use crate::{log_error, log_info, log_warn};

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SegmentRecordedEvent {
    session_id: String,
    segment_id: String,
    sequence: u64,
    source_name: String,
    size_bytes: usize,
    captured_at: DateTime<Utc>,
}

/// Resources owned by one running camera session. Dropping the guard
/// releases the camera.
struct ActiveCapture {
    cancel: CancellationToken,
    loop_handle: JoinHandle<()>,
    stream: StreamGuard,
}

#[derive(Default)]
struct ControllerInner {
    state: CaptureState,
    active: Option<ActiveCapture>,
}

/// Owns the camera for the duration of a session and drives the
/// `Idle -> Starting -> Recording -> Stopping -> Idle` cycle.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Mutex<ControllerInner>>,
    platform: Arc<dyn MediaPlatform>,
    submission: SubmissionClient,
    events: SharedEventSink,
    db: Option<Database>,
    settings: CaptureSettings,
}

impl CaptureController {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        submission: SubmissionClient,
        events: SharedEventSink,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControllerInner::default())),
            platform,
            submission,
            events,
            db: None,
            settings,
        }
    }

    /// Record session rows in SQLite.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub async fn snapshot(&self) -> CaptureState {
        self.inner.lock().await.state.clone()
    }

    /// Switch between upload and camera input. Redundant switches are no-ops.
    pub async fn set_input_mode(&self, mode: InputMode) -> Result<CaptureState, CaptureError> {
        match mode {
            InputMode::Camera => self.start_camera().await,
            InputMode::Upload => Ok(self.stop_camera().await),
        }
    }

    /// Acquire the camera and start cycling segments. A no-op while a
    /// session is already starting, recording or stopping. Acquisition
    /// failures are fatal and never retried.
    pub async fn start_camera(&self) -> Result<CaptureState, CaptureError> {
        let session_id = {
            let mut inner = self.inner.lock().await;
            if inner.state.status != CaptureStatus::Idle {
                log_info!("start_camera ignored in {:?}", inner.state.status);
                return Ok(inner.state.clone());
            }
            let session_id = Uuid::new_v4().to_string();
            inner
                .state
                .begin_starting(session_id.clone(), self.settings.segment_length_secs);
            self.emit_state(&inner.state);
            session_id
        };

        if !self.platform.recording_available() {
            let err = CaptureError::RecordingUnsupported("no recorder on this platform".into());
            self.handle_fatal(&session_id, err.clone()).await;
            return Err(err);
        }

        let constraints = CaptureConstraints {
            device: self.settings.camera_device.clone(),
            audio: self.settings.record_audio,
        };
        let stream = match self.platform.acquire_stream(&constraints).await {
            Ok(stream) => StreamGuard::new(stream),
            Err(err) => {
                self.handle_fatal(&session_id, err.clone()).await;
                return Err(err);
            }
        };

        let mime_type = select_mime_type(self.platform.as_ref(), &self.settings.mime_preferences);
        let record = {
            let mut inner = self.inner.lock().await;
            let still_starting = inner.state.status == CaptureStatus::Starting
                && inner.state.session_id.as_deref() == Some(session_id.as_str());
            if !still_starting {
                // Stopped while acquiring; the guard releases the stream.
                log_info!("camera stopped during start, releasing stream");
                return Ok(inner.state.clone());
            }

            let stream_handle = stream.stream();
            inner
                .state
                .begin_recording(stream_handle.id().to_string(), mime_type.clone());

            let cancel = CancellationToken::new();
            let recorder = SegmentRecorder::new(
                stream_handle,
                mime_type.clone(),
                self.settings.segment_length(),
                session_id.clone(),
            );
            let loop_handle = tokio::spawn(self.clone().run_session(
                session_id.clone(),
                recorder,
                cancel.clone(),
            ));
            inner.active = Some(ActiveCapture {
                cancel,
                loop_handle,
                stream,
            });
            self.emit_state(&inner.state);
            log_info!(
                "camera recording started: session {session_id}, {}s segments, {}",
                self.settings.segment_length_secs,
                mime_type.as_deref().unwrap_or("platform default")
            );

            CaptureSessionRecord {
                id: session_id.clone(),
                started_at: inner.state.started_at.unwrap_or_else(Utc::now),
                stopped_at: None,
                status: SessionStatus::Recording,
                segment_length_secs: self.settings.segment_length_secs,
                segments_recorded: 0,
                mime_type,
                error: None,
            }
        };

        if let Some(db) = &self.db {
            if let Err(err) = db.insert_capture_session(&record).await {
                log_error!("failed to persist capture session {}: {err:?}", record.id);
            }
        }

        Ok(self.snapshot().await)
    }

    /// Stop recording and release the camera. Already-dispatched submissions
    /// keep running. A no-op while idle or already stopping.
    pub async fn stop_camera(&self) -> CaptureState {
        let (session_id, active) = {
            let mut inner = self.inner.lock().await;
            match inner.state.status {
                CaptureStatus::Idle | CaptureStatus::Stopping => {
                    inner.state.input_mode = InputMode::Upload;
                    return inner.state.clone();
                }
                CaptureStatus::Starting => {
                    inner.state.reset_to_idle(None);
                    inner.state.input_mode = InputMode::Upload;
                    self.emit_state(&inner.state);
                    return inner.state.clone();
                }
                CaptureStatus::Recording => {}
            }
            inner.state.begin_stopping();
            self.emit_state(&inner.state);
            (inner.state.session_id.clone(), inner.active.take())
        };

        if let Some(active) = active {
            active.cancel.cancel();
            if let Err(err) = active.loop_handle.await {
                log_warn!("capture loop ended abnormally: {err}");
            }
            drop(active.stream);
        }

        let (state, segments_recorded) = {
            let mut inner = self.inner.lock().await;
            inner.state.reset_to_idle(None);
            inner.state.input_mode = InputMode::Upload;
            self.emit_state(&inner.state);
            (inner.state.clone(), inner.state.segments_recorded)
        };
        log_info!("camera recording stopped after {segments_recorded} segments");

        if let (Some(db), Some(session_id)) = (&self.db, session_id) {
            if let Err(err) = db
                .finish_capture_session(
                    &session_id,
                    SessionStatus::Completed,
                    segments_recorded,
                    Utc::now(),
                    None,
                )
                .await
            {
                log_error!("failed to close capture session {session_id}: {err:?}");
            }
        }

        state
    }

    /// Tear down `session_id` after an unrecoverable error and surface it
    /// once. Errors for sessions that already ended are ignored.
    async fn handle_fatal(&self, session_id: &str, err: CaptureError) {
        let message = err.to_string();
        let (active, segments_recorded) = {
            let mut inner = self.inner.lock().await;
            let current = inner.state.session_id.as_deref() == Some(session_id);
            if !current || !inner.state.is_active() {
                log_warn!("ignoring error for finished session {session_id}: {message}");
                return;
            }
            inner.state.begin_stopping();
            self.emit_state(&inner.state);
            let active = inner.active.take();
            inner.state.reset_to_idle(Some(message.clone()));
            self.emit_state(&inner.state);
            (active, inner.state.segments_recorded)
        };

        // Called from inside the session loop, so the loop handle is not awaited.
        if let Some(active) = active {
            active.cancel.cancel();
            drop(active.stream);

            if let Some(db) = &self.db {
                if let Err(db_err) = db
                    .finish_capture_session(
                        session_id,
                        SessionStatus::Failed,
                        segments_recorded,
                        Utc::now(),
                        Some(message.clone()),
                    )
                    .await
                {
                    log_error!("failed to close capture session {session_id}: {db_err:?}");
                }
            }
        }

        log_error!("capture session {session_id} failed: {message}");
        events::emit(
            self.events.as_ref(),
            CAPTURE_ERROR,
            &ErrorEvent {
                message,
                fatal: true,
            },
        );
    }

    async fn run_session(
        self,
        session_id: String,
        recorder: SegmentRecorder,
        cancel: CancellationToken,
    ) {
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(self.clone().dispatch_segments(segment_rx));

        let exit = recorder.run(cancel, segment_tx).await;
        // The sender is gone once `run` returns, so the dispatcher drains and ends.
        if let Err(err) = dispatcher.await {
            log_warn!("segment dispatcher ended abnormally: {err}");
        }

        if let RecorderExit::Failed(err) = exit {
            self.handle_fatal(&session_id, err).await;
        }
    }

    /// Hand each finished segment to the submission client without waiting
    /// for its result.
    async fn dispatch_segments(self, mut segment_rx: mpsc::UnboundedReceiver<VideoSegment>) {
        while let Some(segment) = segment_rx.recv().await {
            let session_id = segment.session_id.clone().unwrap_or_default();
            let sequence = match segment.source {
                SegmentSource::Camera { sequence } => sequence,
                SegmentSource::Upload => 0,
            };

            {
                let mut inner = self.inner.lock().await;
                if inner.state.session_id.as_deref() == Some(session_id.as_str()) {
                    inner.state.segments_recorded += 1;
                }
            }

            events::emit(
                self.events.as_ref(),
                SEGMENT_RECORDED,
                &SegmentRecordedEvent {
                    session_id,
                    segment_id: segment.id.clone(),
                    sequence,
                    source_name: segment.source_name.clone(),
                    size_bytes: segment.len(),
                    captured_at: segment.captured_at,
                },
            );

            drop(self.submission.spawn_submit(segment));
        }
    }

    fn emit_state(&self, state: &CaptureState) {
        events::emit(self.events.as_ref(), CAPTURE_STATE_CHANGED, state);
    }
}
