use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{SessionStatus, Verdict};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_verdict(value: &str) -> Result<Verdict> {
    Verdict::from_label(value).ok_or_else(|| anyhow!("unknown prediction result {value}"))
}

pub fn parse_session_status(value: &str) -> Result<SessionStatus> {
    match value {
        "Recording" => Ok(SessionStatus::Recording),
        "Completed" => Ok(SessionStatus::Completed),
        "Failed" => Ok(SessionStatus::Failed),
        "Interrupted" => Ok(SessionStatus::Interrupted),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

/// Store optional collections as JSON text; empty collections become NULL.
pub fn to_json_column<T: Serialize>(value: &[T]) -> Result<Option<String>> {
    if value.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(value)
        .map(Some)
        .context("failed to encode JSON column")
}

pub fn from_json_column<T: DeserializeOwned>(value: Option<String>, field: &str) -> Result<Vec<T>> {
    match value {
        Some(raw) => {
            serde_json::from_str(&raw).with_context(|| format!("failed to decode {field}"))
        }
        None => Ok(Vec::new()),
    }
}
