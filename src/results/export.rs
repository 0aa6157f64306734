//! Report export for selected result rows.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{PredictionResult, Verdict};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub deceptive: usize,
    pub truthful: usize,
    pub failed: usize,
    /// Mean confidence over successful rows.
    pub mean_confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report<'a> {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub results: &'a [PredictionResult],
}

pub fn summarize(results: &[PredictionResult]) -> ReportSummary {
    let count = |verdict: Verdict| results.iter().filter(|r| r.result == verdict).count();
    let confidences: Vec<f64> = results
        .iter()
        .filter(|r| !r.is_failed())
        .filter_map(|r| r.confidence.map(f64::from))
        .collect();

    ReportSummary {
        total: results.len(),
        deceptive: count(Verdict::Deceptive),
        truthful: count(Verdict::Truthful),
        failed: count(Verdict::Failed),
        mean_confidence: if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        },
    }
}

pub fn write_report(results: &[PredictionResult], path: &Path) -> Result<ReportSummary> {
    let report = Report {
        generated_at: Utc::now(),
        summary: summarize(results),
        results,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(&report)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write report to {}", path.display()))?;

    Ok(report.summary)
}
