//! Per-request progress tracking.
//!
//! Every in-flight request gets its own entry keyed by request id. Only the
//! most recently started request drives the visible progress bar, and only
//! one poller runs at a time: starting a new request aborts the previous
//! request's poller.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub request_id: String,
    pub progress: u8,
    /// Whether this request currently owns the visible progress bar.
    pub visible: bool,
}

#[derive(Default)]
struct BoardInner {
    entries: HashMap<String, u8>,
    current: Option<String>,
    poller: Option<(String, JoinHandle<()>)>,
}

#[derive(Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new request as the visible one and stop the previous poller.
    pub fn begin(&self, request_id: &str) {
        let mut inner = self.lock();
        if let Some((_, handle)) = inner.poller.take() {
            handle.abort();
        }
        inner.entries.insert(request_id.to_string(), 0);
        inner.current = Some(request_id.to_string());
    }

    /// Hand the poller task for `request_id` to the board. If a newer request
    /// has already started, the poller is aborted immediately.
    pub fn attach_poller(&self, request_id: &str, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if inner.current.as_deref() != Some(request_id) {
            handle.abort();
            return;
        }
        if let Some((_, previous)) = inner.poller.replace((request_id.to_string(), handle)) {
            previous.abort();
        }
    }

    pub fn update(&self, request_id: &str, progress: u8) -> Option<ProgressUpdate> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(request_id)?;
        *entry = progress;
        Some(ProgressUpdate {
            request_id: request_id.to_string(),
            progress,
            visible: inner.current.as_deref() == Some(request_id),
        })
    }

    /// Drop the entry for a finished request and stop its poller if it owns one.
    pub fn finish(&self, request_id: &str) {
        let mut inner = self.lock();
        inner.entries.remove(request_id);
        let owns_poller = matches!(&inner.poller, Some((id, _)) if id == request_id);
        if owns_poller {
            if let Some((_, handle)) = inner.poller.take() {
                handle.abort();
            }
        }
        if inner.current.as_deref() == Some(request_id) {
            inner.current = None;
        }
    }

    /// Release the poller slot when the poller exits on its own (progress hit 100).
    pub fn poller_done(&self, request_id: &str) {
        let mut inner = self.lock();
        if matches!(&inner.poller, Some((id, _)) if id == request_id) {
            inner.poller = None;
        }
    }

    pub fn get(&self, request_id: &str) -> Option<u8> {
        self.lock().entries.get(request_id).copied()
    }

    /// Progress of the visible request, or 100 when nothing is in flight.
    pub fn visible_progress(&self) -> u8 {
        let inner = self.lock();
        inner
            .current
            .as_ref()
            .and_then(|id| inner.entries.get(id).copied())
            .unwrap_or(100)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn has_poller(&self) -> bool {
        self.lock().poller.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn progress_is_namespaced_per_request() {
        let board = ProgressBoard::new();
        board.begin("a");
        board.begin("b");

        let a = board.update("a", 40).unwrap();
        let b = board.update("b", 10).unwrap();

        assert!(!a.visible);
        assert!(b.visible);
        assert_eq!(board.get("a"), Some(40));
        assert_eq!(board.visible_progress(), 10);
        assert_eq!(board.in_flight(), 2);
    }

    #[test]
    fn finished_requests_ignore_late_updates() {
        let board = ProgressBoard::new();
        board.begin("a");
        board.finish("a");

        assert!(board.update("a", 50).is_none());
        assert_eq!(board.visible_progress(), 100);
    }

    #[tokio::test]
    async fn new_request_aborts_previous_poller() {
        let board = ProgressBoard::new();
        board.begin("a");
        let first = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        board.attach_poller("a", first);

        board.begin("b");
        assert!(!board.has_poller());

        let stale = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        // "a" is no longer current, so its late poller is rejected.
        board.attach_poller("a", stale);
        assert!(!board.has_poller());
    }
}
