//! Camera and recording collaborators.
//!
//! The capture loop only talks to these traits; `FfmpegPlatform` is the
//! native implementation and tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Could not access camera: {0}")]
    PermissionDenied(String),
    #[error("Could not access camera: {0}")]
    DeviceUnavailable(String),
    #[error("Video recording is not supported: {0}")]
    RecordingUnsupported(String),
    #[error("Failed to start camera recording: {0}")]
    Recorder(String),
    #[error("Camera stream ended")]
    StreamEnded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Platform device name; `None` means the default camera.
    pub device: Option<String>,
    pub audio: bool,
}

/// One recording cycle. `stop` finalizes the container and returns its bytes.
#[async_trait]
pub trait MediaRecorder: Send {
    /// Negotiated container type, if the recorder knows it.
    fn mime_type(&self) -> Option<&str>;
    async fn start(&mut self) -> Result<(), CaptureError>;
    async fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;
    /// Tear down without producing a segment.
    async fn abort(&mut self);
}

pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;
    fn is_active(&self) -> bool;
    fn create_recorder(&self, mime_type: Option<&str>) -> Result<Box<dyn MediaRecorder>, CaptureError>;
    /// Release the camera. Calling it more than once is harmless.
    fn stop_tracks(&self);
}

#[async_trait]
pub trait MediaPlatform: Send + Sync {
    fn recording_available(&self) -> bool;
    fn is_type_supported(&self, mime_type: &str) -> bool;
    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError>;
}

/// Owns a stream for the lifetime of a capture session and stops its tracks
/// when dropped, whatever path the session exits through.
pub struct StreamGuard {
    stream: Arc<dyn MediaStream>,
}

impl StreamGuard {
    pub fn new(stream: Arc<dyn MediaStream>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> Arc<dyn MediaStream> {
        Arc::clone(&self.stream)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stream.stop_tracks();
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Scriptable in-memory platform used by recorder and controller tests.

    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeStats {
        pub acquisitions: AtomicUsize,
        pub recorders_created: AtomicUsize,
        pub recorders_stopped: AtomicUsize,
        pub recorders_aborted: AtomicUsize,
        pub track_stops: AtomicUsize,
    }

    pub(crate) struct FakePlatform {
        pub stats: Arc<FakeStats>,
        pub acquire_error: Mutex<Option<CaptureError>>,
        /// Recorder creation fails once this many recorders exist.
        pub fail_recorder_after: Option<usize>,
        pub segment_bytes: Vec<u8>,
        pub supported: Vec<String>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self {
                stats: Arc::new(FakeStats::default()),
                acquire_error: Mutex::new(None),
                fail_recorder_after: None,
                segment_bytes: vec![0x1a, 0x45, 0xdf, 0xa3],
                supported: vec!["video/webm;codecs=vp8,opus".into(), "video/webm".into()],
            }
        }

        pub fn denying(error: CaptureError) -> Self {
            let platform = Self::new();
            *platform.acquire_error.lock().unwrap() = Some(error);
            platform
        }

        pub fn stats(&self) -> Arc<FakeStats> {
            Arc::clone(&self.stats)
        }
    }

    #[async_trait]
    impl MediaPlatform for FakePlatform {
        fn recording_available(&self) -> bool {
            true
        }

        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.supported.iter().any(|m| m == mime_type)
        }

        async fn acquire_stream(
            &self,
            _constraints: &CaptureConstraints,
        ) -> Result<Arc<dyn MediaStream>, CaptureError> {
            self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.acquire_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(Arc::new(FakeStream {
                stats: Arc::clone(&self.stats),
                active: AtomicBool::new(true),
                fail_recorder_after: self.fail_recorder_after,
                segment_bytes: self.segment_bytes.clone(),
            }))
        }
    }

    pub(crate) struct FakeStream {
        stats: Arc<FakeStats>,
        active: AtomicBool,
        fail_recorder_after: Option<usize>,
        segment_bytes: Vec<u8>,
    }

    impl MediaStream for FakeStream {
        fn id(&self) -> &str {
            "fake-stream"
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn create_recorder(
            &self,
            mime_type: Option<&str>,
        ) -> Result<Box<dyn MediaRecorder>, CaptureError> {
            let created = self.stats.recorders_created.load(Ordering::SeqCst);
            if self.fail_recorder_after.is_some_and(|limit| created >= limit) {
                return Err(CaptureError::Recorder("encoder crashed".into()));
            }
            self.stats.recorders_created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeRecorder {
                stats: Arc::clone(&self.stats),
                mime_type: mime_type.map(str::to_string),
                bytes: self.segment_bytes.clone(),
            }))
        }

        fn stop_tracks(&self) {
            if self.active.swap(false, Ordering::SeqCst) {
                self.stats.track_stops.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub(crate) struct FakeRecorder {
        stats: Arc<FakeStats>,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl MediaRecorder for FakeRecorder {
        fn mime_type(&self) -> Option<&str> {
            self.mime_type.as_deref()
        }

        async fn start(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
            self.stats.recorders_stopped.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }

        async fn abort(&mut self) {
            self.stats.recorders_aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}
