use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};

use crate::db::Database;
use crate::models::PredictionResult;

use super::export::{write_report, ReportSummary};
use super::preview::{PreviewSink, PreviewSource};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "results";

use crate::{log_error, log_info, log_warn};

#[derive(Default)]
struct StoreInner {
    entries: Vec<PredictionResult>,
    selected: Option<String>,
}

/// Ordered collection of prediction outcomes.
///
/// Order is completion order. Entries are only ever appended or removed by
/// explicit deletion; selection never changes the entries themselves.
/// Clones share the same underlying store.
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<Mutex<StoreInner>>,
    preview: Arc<dyn PreviewSink>,
    db: Option<Database>,
}

impl ResultStore {
    pub fn new(preview: Arc<dyn PreviewSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            preview,
            db: None,
        }
    }

    /// Mirror appends and deletions into SQLite.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Load persisted rows ahead of anything appended this run.
    pub async fn load_history(&self) -> Result<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };
        let history = db.list_predictions().await?;

        let mut inner = self.lock();
        let mut restored = Vec::with_capacity(history.len() + inner.entries.len());
        for row in history {
            if !inner.entries.iter().any(|existing| existing.id == row.id) {
                restored.push(row);
            }
        }
        let count = restored.len();
        restored.append(&mut inner.entries);
        inner.entries = restored;
        drop(inner);

        log_info!("restored {count} results from history");
        Ok(count)
    }

    /// Append one result. Returns `false` if a result with the same id is
    /// already present; the store never holds two rows for one submission.
    pub async fn append(&self, result: PredictionResult) -> bool {
        {
            let mut inner = self.lock();
            if inner.entries.iter().any(|existing| existing.id == result.id) {
                log_warn!("ignoring duplicate result {}", result.id);
                return false;
            }
            inner.entries.push(result.clone());
        }

        if let Some(db) = &self.db {
            if let Err(err) = db.insert_prediction(&result).await {
                log_error!("failed to persist result {}: {err:?}", result.id);
            }
        }
        true
    }

    pub fn list(&self) -> Vec<PredictionResult> {
        self.lock().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<PredictionResult> {
        self.lock().entries.iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Remove every entry whose id is in `ids`. Clears the selection if the
    /// selected entry is removed. Returns how many entries were removed.
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let (removed, cleared_selection) = {
            let mut inner = self.lock();
            let before = inner.entries.len();
            inner.entries.retain(|r| !ids.contains(&r.id));
            let removed = before - inner.entries.len();

            let cleared = match &inner.selected {
                Some(selected) if ids.contains(selected) => {
                    inner.selected = None;
                    true
                }
                _ => false,
            };
            (removed, cleared)
        };

        if cleared_selection {
            self.preview.clear();
        }

        if let Some(db) = &self.db {
            db.delete_predictions(ids).await?;
        }

        log_info!("deleted {removed} results");
        Ok(removed)
    }

    /// Select a result for preview. The preview sink is told to show it;
    /// the store contents are untouched.
    pub fn select(&self, id: &str) -> Result<PreviewSource> {
        let result = self
            .get(id)
            .ok_or_else(|| anyhow!("no result with id {id}"))?;
        let source = self.preview.show(&result)?;
        self.lock().selected = Some(id.to_string());
        Ok(source)
    }

    pub fn selected(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    pub fn clear_selection(&self) {
        let had_selection = self.lock().selected.take().is_some();
        if had_selection {
            self.preview.clear();
        }
    }

    /// Write the given rows (all rows when `ids` is empty) as a JSON report.
    pub fn export(&self, ids: &[String], path: &Path) -> Result<ReportSummary> {
        let rows: Vec<PredictionResult> = self
            .list()
            .into_iter()
            .filter(|r| ids.is_empty() || ids.contains(&r.id))
            .collect();
        write_report(&rows, path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::VideoSegment;

    #[derive(Default)]
    pub(crate) struct RecordingPreview {
        pub shown: Mutex<Vec<String>>,
        pub clears: Mutex<usize>,
    }

    impl PreviewSink for RecordingPreview {
        fn show(&self, result: &PredictionResult) -> Result<PreviewSource> {
            self.shown.lock().unwrap().push(result.id.clone());
            Ok(PreviewSource {
                result_id: result.id.clone(),
                video_name: result.video_name.clone(),
                path: None,
            })
        }

        fn clear(&self) {
            *self.clears.lock().unwrap() += 1;
        }
    }

    fn row(name: &str) -> PredictionResult {
        let segment = VideoSegment::from_upload(vec![1, 2], "video/mp4", name);
        PredictionResult::failed(&segment, "x")
    }

    fn store() -> (ResultStore, Arc<RecordingPreview>) {
        let preview = Arc::new(RecordingPreview::default());
        (ResultStore::new(preview.clone()), preview)
    }

    #[tokio::test]
    async fn append_keeps_order_and_rejects_duplicates() {
        let (store, _) = store();
        let first = row("a.mp4");
        let second = row("b.mp4");

        assert!(store.append(first.clone()).await);
        assert!(store.append(second.clone()).await);
        assert!(!store.append(first.clone()).await);

        let names: Vec<_> = store.list().into_iter().map(|r| r.video_name).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
    }

    #[tokio::test]
    async fn selecting_notifies_preview_without_touching_entries() {
        let (store, preview) = store();
        let first = row("a.mp4");
        let second = row("b.mp4");
        store.append(first.clone()).await;
        store.append(second.clone()).await;

        let before: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
        store.select(&second.id).unwrap();
        let after: Vec<_> = store.list().into_iter().map(|r| r.id).collect();

        assert_eq!(before, after);
        assert_eq!(store.selected(), Some(second.id.clone()));
        assert_eq!(*preview.shown.lock().unwrap(), vec![second.id]);
    }

    #[tokio::test]
    async fn deleting_selected_entry_clears_selection() {
        let (store, preview) = store();
        let keep = row("a.mp4");
        let doomed = row("b.mp4");
        store.append(keep.clone()).await;
        store.append(doomed.clone()).await;
        store.select(&doomed.id).unwrap();

        let removed = store.delete(&[doomed.id.clone()]).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.selected(), None);
        assert_eq!(*preview.clears.lock().unwrap(), 1);
        assert!(store.get(&doomed.id).is_none());
        assert!(store.get(&keep.id).is_some());
    }

    #[tokio::test]
    async fn deleting_other_entries_keeps_selection() {
        let (store, preview) = store();
        let selected = row("a.mp4");
        let other = row("b.mp4");
        store.append(selected.clone()).await;
        store.append(other.clone()).await;
        store.select(&selected.id).unwrap();

        store.delete(&[other.id.clone()]).await.unwrap();

        assert_eq!(store.selected(), Some(selected.id));
        assert_eq!(*preview.clears.lock().unwrap(), 0);
    }

    #[test]
    fn selecting_unknown_id_fails() {
        let (store, preview) = store();
        assert!(store.select("nope").is_err());
        assert!(preview.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_restored_before_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("deeplie.sqlite3")).unwrap();
        let old = row("old.mp4");
        db.insert_prediction(&old).await.unwrap();

        let (store, _) = store();
        let store = store.with_database(db);
        let fresh = row("fresh.mp4");
        store.append(fresh.clone()).await;

        assert_eq!(store.load_history().await.unwrap(), 1);
        let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![old.id, fresh.id]);
    }

    #[tokio::test]
    async fn camera_rows_persist_without_a_session_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deeplie.sqlite3");
        let db = Database::new(path.clone()).unwrap();
        let store = ResultStore::new(Arc::new(RecordingPreview::default())).with_database(db);

        let segment =
            VideoSegment::from_camera(vec![1; 8], "video/webm", chrono::Utc::now(), "unsaved", 1);
        let result = PredictionResult::failed(&segment, "timeout");
        assert!(store.append(result.clone()).await);

        let reopened = Database::new(path).unwrap();
        let rows = reopened.list_predictions().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, result.id);
        assert_eq!(rows[0].session_id.as_deref(), Some("unsaved"));
    }
}
