use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::task::TaskTracker;

use crate::events::{self, SharedEventSink, PREDICTION_COMPLETED, PREDICTION_PROGRESS};
use crate::models::{PredictionResult, SourceBlob, Verdict, VideoSegment, Visualization};
use crate::results::ResultStore;

use super::api::{ApiError, PredictResponse, PredictionApi};
use super::progress::ProgressBoard;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "submission";

use crate::{log_debug, log_info, log_warn};

/// Posts one segment at a time to the prediction service and turns every
/// outcome, success or failure, into exactly one row of the result store.
#[derive(Clone)]
pub struct SubmissionClient {
    api: Arc<dyn PredictionApi>,
    store: ResultStore,
    progress: ProgressBoard,
    events: SharedEventSink,
    poll_interval: Duration,
    tasks: TaskTracker,
}

impl SubmissionClient {
    pub fn new(
        api: Arc<dyn PredictionApi>,
        store: ResultStore,
        events: SharedEventSink,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            progress: ProgressBoard::new(),
            events,
            poll_interval,
            tasks: TaskTracker::new(),
        }
    }

    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Submit one segment and wait for its result. The result has already
    /// been appended to the store when this returns.
    pub async fn submit(&self, segment: VideoSegment) -> PredictionResult {
        let request_id = segment.id.clone();
        log_info!(
            "submitting {} ({} bytes, {})",
            segment.source_name,
            segment.len(),
            segment.mime_type
        );

        self.progress.begin(&request_id);
        self.emit_progress(&request_id, 0);
        let poller = tokio::spawn(poll_progress(
            Arc::clone(&self.api),
            self.progress.clone(),
            Arc::clone(&self.events),
            request_id.clone(),
            self.poll_interval,
        ));
        self.progress.attach_poller(&request_id, poller);

        let outcome = self.api.predict(&segment).await;
        self.progress.finish(&request_id);

        let result = match outcome {
            Ok(response) => map_response(&segment, response),
            Err(err) => {
                log_warn!("prediction failed for {}: {err}", segment.source_name);
                PredictionResult::failed(&segment, err.to_string())
            }
        };

        self.store.append(result.clone()).await;
        events::emit(self.events.as_ref(), PREDICTION_COMPLETED, &result);
        result
    }

    /// Fire-and-forget variant used by the capture loop.
    pub fn spawn_submit(&self, segment: VideoSegment) -> tokio::task::JoinHandle<PredictionResult> {
        let client = self.clone();
        self.tasks.spawn(async move { client.submit(segment).await })
    }

    /// Wait for every submission started with `spawn_submit` to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn emit_progress(&self, request_id: &str, value: u8) {
        if let Some(update) = self.progress.update(request_id, value) {
            events::emit(self.events.as_ref(), PREDICTION_PROGRESS, &update);
        }
    }
}

/// Poll `/api/progress` until it reports 100. Errors are logged and the
/// poll continues; they never touch the owning submission.
async fn poll_progress(
    api: Arc<dyn PredictionApi>,
    board: ProgressBoard,
    events: SharedEventSink,
    request_id: String,
    every: Duration,
) {
    let mut ticker = time::interval_at(time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match api.progress().await {
            Ok(value) => {
                log_debug!("progress {request_id}: {value}");
                if let Some(update) = board.update(&request_id, value) {
                    events::emit(events.as_ref(), PREDICTION_PROGRESS, &update);
                }
                if value >= 100 {
                    board.poller_done(&request_id);
                    break;
                }
            }
            Err(err) => log_warn!("progress poll error: {err}"),
        }
    }
}

/// Turn a 2xx response body into a result row.
pub fn map_response(segment: &VideoSegment, response: PredictResponse) -> PredictionResult {
    if let Some(error) = response.error.filter(|e| !e.trim().is_empty()) {
        return PredictionResult::failed(segment, error);
    }

    let score = response.prediction.first().copied();
    let verdict = response
        .result
        .as_deref()
        .and_then(Verdict::from_label)
        .or_else(|| score.map(verdict_from_score));

    let Some(verdict) = verdict else {
        return PredictionResult::failed(
            segment,
            ApiError::Malformed("response has neither prediction nor result".into()).to_string(),
        );
    };

    let confidence = response
        .confidence
        .as_ref()
        .and_then(|value| value.as_percent())
        .or_else(|| score.map(confidence_from_score))
        .map(|percent| percent.clamp(0.0, 100.0).round() as u8);

    let visualization = match response.visualization.as_deref() {
        Some(encoded) => match decode_visualization(encoded) {
            Ok(image) => Some(image),
            Err(err) => {
                log_warn!("dropping unreadable visualization for {}: {err:#}", segment.source_name);
                None
            }
        },
        None => None,
    };

    PredictionResult {
        id: segment.id.clone(),
        time: Utc::now(),
        captured_at: segment.captured_at,
        result: verdict,
        confidence,
        video_name: segment.source_name.clone(),
        source: segment.source,
        session_id: segment.session_id.clone(),
        emotions: response.emotions,
        confidence_timeline: response.confidence_timeline,
        visualization,
        source_blob: Some(SourceBlob::from(segment)),
        error: None,
    }
}

/// Scores above 0.5 read as deceptive.
pub fn verdict_from_score(score: f64) -> Verdict {
    if score > 0.5 {
        Verdict::Deceptive
    } else {
        Verdict::Truthful
    }
}

/// Distance from the 0.5 decision boundary, scaled to a percentage.
pub fn confidence_from_score(score: f64) -> f64 {
    ((score - 0.5).abs() * 200.0).round()
}

pub fn decode_visualization(encoded: &str) -> Result<Visualization> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    }
    .trim();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("visualization is not valid base64")?;
    let image = image::load_from_memory(&bytes).context("visualization is not a readable image")?;
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("visualization has no pixels"));
    }

    Ok(Visualization {
        png_base64: payload.to_string(),
        width: image.width(),
        height: image.height(),
    })
}
