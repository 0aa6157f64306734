//! Event bus between the backend and whatever front-end drives it.
//!
//! Components emit named JSON payloads; the sink decides where they go.

use std::sync::Arc;

use log::info;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

pub const CAPTURE_STATE_CHANGED: &str = "capture-state-changed";
pub const SEGMENT_RECORDED: &str = "segment-recorded";
pub const PREDICTION_PROGRESS: &str = "prediction-progress";
pub const PREDICTION_COMPLETED: &str = "prediction-completed";
pub const CAPTURE_ERROR: &str = "capture-error";
pub const PREVIEW_SELECTED: &str = "preview-selected";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

pub type SharedEventSink = Arc<dyn EventSink>;

/// Serialize `payload` and hand it to `sink`. Serialization failures are
/// logged and dropped: events are notifications, never control flow.
pub fn emit<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(err) => log::error!("failed to serialize {event} payload: {err}"),
    }
}

/// Default sink: writes every event to the log.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &str, payload: Value) {
        info!(target: "events", "{event}: {payload}");
    }
}

/// Forwards events into an unbounded channel; used by the CLI and tests.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &str, payload: Value) {
        let _ = self.tx.send((event.to_string(), payload));
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub message: String,
    /// Fatal errors end the capture session; the front-end shows a blocking dialog.
    pub fatal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_sink_forwards_serialized_payloads() {
        let (sink, mut rx) = ChannelEventSink::new();
        emit(
            &sink,
            CAPTURE_ERROR,
            &ErrorEvent {
                message: "camera denied".into(),
                fatal: true,
            },
        );

        let (name, payload) = rx.try_recv().unwrap();
        assert_eq!(name, CAPTURE_ERROR);
        assert_eq!(payload, json!({ "message": "camera denied", "fatal": true }));
    }
}
