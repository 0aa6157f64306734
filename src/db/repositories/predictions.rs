use anyhow::Result;
use rusqlite::{params, params_from_iter, Row};

use crate::db::{
    connection::Database,
    helpers::{from_json_column, parse_datetime, parse_verdict, to_i64, to_json_column, to_u64},
};
use crate::models::{PredictionResult, SegmentSource, Visualization};

const SELECT_COLUMNS: &str = "id, completed_at, captured_at, result, confidence, video_name,
     source_kind, source_sequence, session_id, emotions_json, confidence_timeline_json,
     visualization_json, error";

fn row_to_prediction(row: &Row) -> Result<PredictionResult> {
    let completed_at: String = row.get("completed_at")?;
    let captured_at: String = row.get("captured_at")?;
    let result: String = row.get("result")?;
    let confidence: Option<i64> = row.get("confidence")?;
    let source_kind: String = row.get("source_kind")?;
    let source_sequence: Option<i64> = row.get("source_sequence")?;
    let visualization: Option<String> = row.get("visualization_json")?;

    let source = match (source_kind.as_str(), source_sequence) {
        ("camera", Some(sequence)) => SegmentSource::Camera {
            sequence: to_u64(sequence, "source_sequence")?,
        },
        _ => SegmentSource::Upload,
    };

    let visualization = match visualization {
        Some(raw) => Some(serde_json::from_str::<Visualization>(&raw)?),
        None => None,
    };

    Ok(PredictionResult {
        id: row.get("id")?,
        time: parse_datetime(&completed_at, "completed_at")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
        result: parse_verdict(&result)?,
        confidence: confidence.map(|value| value.clamp(0, 100) as u8),
        video_name: row.get("video_name")?,
        source,
        session_id: row.get("session_id")?,
        emotions: from_json_column(row.get("emotions_json")?, "emotions_json")?,
        confidence_timeline: from_json_column(
            row.get("confidence_timeline_json")?,
            "confidence_timeline_json",
        )?,
        visualization,
        source_blob: None,
        error: row.get("error")?,
    })
}

impl Database {
    pub async fn insert_prediction(&self, prediction: &PredictionResult) -> Result<()> {
        let record = prediction.clone();
        self.execute(move |conn| {
            let (source_kind, source_sequence) = match record.source {
                SegmentSource::Camera { sequence } => ("camera", Some(to_i64(sequence)?)),
                SegmentSource::Upload => ("upload", None),
            };
            let visualization = record
                .visualization
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            conn.execute(
                "INSERT INTO predictions (
                    id, completed_at, captured_at, result, confidence, video_name,
                    source_kind, source_sequence, session_id, emotions_json,
                    confidence_timeline_json, visualization_json, error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    record.time.to_rfc3339(),
                    record.captured_at.to_rfc3339(),
                    record.result.as_str(),
                    record.confidence.map(i64::from),
                    record.video_name,
                    source_kind,
                    source_sequence,
                    record.session_id,
                    to_json_column(&record.emotions)?,
                    to_json_column(&record.confidence_timeline)?,
                    visualization,
                    record.error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// All persisted predictions in insertion (completion) order.
    pub async fn list_predictions(&self) -> Result<Vec<PredictionResult>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM predictions ORDER BY rowid ASC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut predictions = Vec::new();
            while let Some(row) = rows.next()? {
                predictions.push(row_to_prediction(row)?);
            }
            Ok(predictions)
        })
        .await
    }

    pub async fn get_predictions_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<PredictionResult>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM predictions
                 WHERE session_id = ?1
                 ORDER BY captured_at ASC"
            ))?;
            let mut rows = stmt.query(params![session_id])?;
            let mut predictions = Vec::new();
            while let Some(row) = rows.next()? {
                predictions.push(row_to_prediction(row)?);
            }
            Ok(predictions)
        })
        .await
    }

    /// Delete the given ids; unknown ids are ignored. Returns rows removed.
    pub async fn delete_predictions(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let removed = conn.execute(
                &format!("DELETE FROM predictions WHERE id IN ({placeholders})"),
                params_from_iter(ids.iter()),
            )?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Emotion, VideoSegment};
    use chrono::Utc;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("deeplie.sqlite3")).unwrap();
        (dir, db)
    }

    fn camera_result(sequence: u64) -> PredictionResult {
        let segment = VideoSegment::from_camera(vec![0; 4], "video/webm", Utc::now(), "s1", sequence);
        let mut result = PredictionResult::failed(&segment, "placeholder");
        result.result = crate::models::Verdict::Truthful;
        result.confidence = Some(64);
        result.error = None;
        result.emotions = vec![Emotion {
            name: "calm".into(),
            value: 71.5,
        }];
        result
    }

    #[tokio::test]
    async fn insert_and_list_preserves_order_and_fields() {
        let (_dir, db) = open_db();
        let first = camera_result(2);
        let second = camera_result(1);
        db.insert_prediction(&first).await.unwrap();
        db.insert_prediction(&second).await.unwrap();

        let listed = db.list_predictions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
        assert_eq!(listed[0].source, SegmentSource::Camera { sequence: 2 });
        assert_eq!(listed[0].confidence, Some(64));
        assert_eq!(listed[0].emotions[0].name, "calm");
        assert_eq!(listed[0].session_id.as_deref(), Some("s1"));
        assert!(listed[0].source_blob.is_none());
    }

    #[tokio::test]
    async fn delete_removes_only_named_rows() {
        let (_dir, db) = open_db();
        let keep = camera_result(1);
        let doomed = camera_result(2);
        db.insert_prediction(&keep).await.unwrap();
        db.insert_prediction(&doomed).await.unwrap();

        let removed = db
            .delete_predictions(&[doomed.id.clone(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let listed = db.list_predictions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);
    }

    #[tokio::test]
    async fn session_query_filters_by_session() {
        let (_dir, db) = open_db();
        let in_session = camera_result(1);
        let segment = VideoSegment::from_upload(vec![1], "video/mp4", "upload.mp4");
        let upload = PredictionResult::failed(&segment, "timeout");
        db.insert_prediction(&in_session).await.unwrap();
        db.insert_prediction(&upload).await.unwrap();

        let rows = db.get_predictions_for_session("s1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, in_session.id);
        assert!(db.get_predictions_for_session("other").await.unwrap().is_empty());
    }
}
