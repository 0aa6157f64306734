use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_session_status, to_i64, to_u64},
};
use crate::models::{CaptureSessionRecord, SessionStatus};

fn row_to_session(row: &Row) -> Result<CaptureSessionRecord> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let status: String = row.get("status")?;
    let segment_length_secs: i64 = row.get("segment_length_secs")?;
    let segments_recorded: i64 = row.get("segments_recorded")?;

    Ok(CaptureSessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_session_status(&status)?,
        segment_length_secs: to_u64(segment_length_secs, "segment_length_secs")?,
        segments_recorded: to_u64(segments_recorded, "segments_recorded")?,
        mime_type: row.get("mime_type")?,
        error: row.get("error")?,
    })
}

impl Database {
    pub async fn insert_capture_session(&self, session: &CaptureSessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO capture_sessions (id, started_at, stopped_at, status, segment_length_secs, segments_recorded, mime_type, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    to_i64(record.segment_length_secs)?,
                    to_i64(record.segments_recorded)?,
                    record.mime_type,
                    record.error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn finish_capture_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        segments_recorded: u64,
        stopped_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE capture_sessions
                 SET status = ?1,
                     segments_recorded = ?2,
                     stopped_at = ?3,
                     error = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    to_i64(segments_recorded)?,
                    stopped_at.to_rfc3339(),
                    error,
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Close out sessions left `Recording` by a crash. Returns how many were marked.
    pub async fn mark_incomplete_sessions_interrupted(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE capture_sessions
                 SET status = ?1,
                     stopped_at = ?2
                 WHERE status = ?3",
                params![
                    SessionStatus::Interrupted.as_str(),
                    now.to_rfc3339(),
                    SessionStatus::Recording.as_str(),
                ],
            )?;
            Ok(updated)
        })
        .await
    }

    pub async fn list_capture_sessions(&self) -> Result<Vec<CaptureSessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, stopped_at, status, segment_length_secs, segments_recorded, mime_type, error
                 FROM capture_sessions
                 ORDER BY started_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
