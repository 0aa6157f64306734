use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

use crate::models::VideoSegment;

use super::platform::{CaptureError, MediaPlatform, MediaRecorder, MediaStream};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "capture::recorder";

use crate::{log_debug, log_info, log_warn};

/// Container assumed when neither the session nor the recorder names one.
const FALLBACK_MIME: &str = "video/webm";

/// First entry of `preferences` the platform can record, or `None` to let
/// the platform choose its default.
pub fn select_mime_type(platform: &dyn MediaPlatform, preferences: &[String]) -> Option<String> {
    preferences
        .iter()
        .find(|mime| platform.is_type_supported(mime))
        .cloned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderExit {
    Cancelled,
    Failed(CaptureError),
}

/// Cuts a live stream into independently decodable segments by stopping
/// the recorder at every boundary and starting a fresh one.
pub struct SegmentRecorder {
    stream: Arc<dyn MediaStream>,
    mime_type: Option<String>,
    segment_length: Duration,
    session_id: String,
}

impl SegmentRecorder {
    pub fn new(
        stream: Arc<dyn MediaStream>,
        mime_type: Option<String>,
        segment_length: Duration,
        session_id: String,
    ) -> Self {
        Self {
            stream,
            mime_type,
            segment_length,
            session_id,
        }
    }

    /// Record until `cancel` fires or a cycle fails. Finished segments go to
    /// `segment_tx` in capture order. A failure is returned once and never
    /// retried.
    pub async fn run(
        self,
        cancel: CancellationToken,
        segment_tx: mpsc::UnboundedSender<VideoSegment>,
    ) -> RecorderExit {
        let mut sequence = 0u64;
        let mut deadline = time::Instant::now() + self.segment_length;
        let (mut recorder, mut cycle_started) = match self.begin_cycle().await {
            Ok(cycle) => cycle,
            Err(err) => return RecorderExit::Failed(err),
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    recorder.abort().await;
                    log_info!("segment recorder cancelled for session {}", self.session_id);
                    return RecorderExit::Cancelled;
                }
                _ = time::sleep_until(deadline) => {}
            }

            if !self.stream.is_active() {
                recorder.abort().await;
                return RecorderExit::Failed(CaptureError::StreamEnded);
            }

            let bytes = match recorder.stop().await {
                Ok(bytes) => bytes,
                Err(err) => return RecorderExit::Failed(err),
            };
            let mime_type = recorder
                .mime_type()
                .map(str::to_string)
                .or_else(|| self.mime_type.clone())
                .unwrap_or_else(|| FALLBACK_MIME.to_string());
            drop(recorder);

            if bytes.is_empty() {
                log_warn!("skipping empty segment in session {}", self.session_id);
            } else {
                sequence += 1;
                let segment = VideoSegment::from_camera(
                    bytes,
                    mime_type,
                    cycle_started,
                    &self.session_id,
                    sequence,
                );
                log_debug!("segment {} ready ({} bytes)", segment.source_name, segment.len());
                if segment_tx.send(segment).is_err() {
                    return RecorderExit::Cancelled;
                }
            }

            if cancel.is_cancelled() {
                return RecorderExit::Cancelled;
            }

            // Fixed deadlines keep the cadence from drifting by stop/start latency.
            deadline += self.segment_length;
            (recorder, cycle_started) = match self.begin_cycle().await {
                Ok(cycle) => cycle,
                Err(err) => return RecorderExit::Failed(err),
            };
        }
    }

    /// The restart transition: a brand-new recorder for the next segment.
    async fn begin_cycle(&self) -> Result<(Box<dyn MediaRecorder>, DateTime<Utc>), CaptureError> {
        let mut recorder = self.stream.create_recorder(self.mime_type.as_deref())?;
        recorder.start().await?;
        Ok((recorder, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::capture::platform::fakes::FakePlatform;
    use crate::capture::platform::CaptureConstraints;
    use crate::models::SegmentSource;

    async fn stream_for(platform: &FakePlatform) -> Arc<dyn MediaStream> {
        platform
            .acquire_stream(&CaptureConstraints::default())
            .await
            .unwrap()
    }

    #[test]
    fn picks_first_supported_preference() {
        let platform = FakePlatform::new();
        let prefs: Vec<String> = crate::settings::DEFAULT_MIME_PREFERENCES
            .iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(
            select_mime_type(&platform, &prefs).as_deref(),
            Some("video/webm;codecs=vp8,opus")
        );
        assert_eq!(select_mime_type(&platform, &["video/mp4".to_string()]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_segment_per_interval() {
        let platform = FakePlatform::new();
        let stream = stream_for(&platform).await;
        let recorder = SegmentRecorder::new(
            stream,
            Some("video/webm".into()),
            Duration::from_secs(30),
            "session".into(),
        );
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = time::Instant::now();
        let task = tokio::spawn(recorder.run(cancel.clone(), tx));

        let mut arrivals = Vec::new();
        for _ in 0..3 {
            let segment = rx.recv().await.unwrap();
            arrivals.push((time::Instant::now() - started, segment.source));
        }
        cancel.cancel();

        assert_eq!(task.await.unwrap(), RecorderExit::Cancelled);
        assert_eq!(
            arrivals,
            vec![
                (Duration::from_secs(30), SegmentSource::Camera { sequence: 1 }),
                (Duration::from_secs(60), SegmentSource::Camera { sequence: 2 }),
                (Duration::from_secs(90), SegmentSource::Camera { sequence: 3 }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_without_restarting() {
        let platform = FakePlatform::new();
        let stats = platform.stats();
        let stream = stream_for(&platform).await;
        let recorder = SegmentRecorder::new(stream, None, Duration::from_secs(30), "s".into());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(recorder.run(cancel.clone(), tx));

        time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), RecorderExit::Cancelled);
        assert!(rx.recv().await.is_none());
        assert_eq!(stats.recorders_created.load(Ordering::SeqCst), 1);
        assert_eq!(stats.recorders_aborted.load(Ordering::SeqCst), 1);
        assert_eq!(stats.recorders_stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recorder_failure_is_reported_once() {
        let mut platform = FakePlatform::new();
        platform.fail_recorder_after = Some(2);
        let stats = platform.stats();
        let stream = stream_for(&platform).await;
        let recorder = SegmentRecorder::new(stream, None, Duration::from_secs(5), "s".into());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let exit = recorder.run(CancellationToken::new(), tx).await;

        assert!(matches!(exit, RecorderExit::Failed(CaptureError::Recorder(_))));
        assert_eq!(stats.recorders_created.load(Ordering::SeqCst), 2);
        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_segments_are_skipped() {
        let mut platform = FakePlatform::new();
        platform.segment_bytes = Vec::new();
        let stream = stream_for(&platform).await;
        let recorder = SegmentRecorder::new(stream, None, Duration::from_secs(5), "s".into());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(recorder.run(cancel.clone(), tx));

        time::sleep(Duration::from_secs(16)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_ending_fails_the_session() {
        let platform = FakePlatform::new();
        let stream = stream_for(&platform).await;
        let recorder =
            SegmentRecorder::new(Arc::clone(&stream), None, Duration::from_secs(5), "s".into());
        let (tx, _rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(recorder.run(CancellationToken::new(), tx));

        time::sleep(Duration::from_secs(2)).await;
        stream.stop_tracks();

        assert_eq!(
            task.await.unwrap(),
            RecorderExit::Failed(CaptureError::StreamEnded)
        );
    }
}
