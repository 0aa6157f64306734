//! Video preview collaborator.
//!
//! Selecting a result hands its source bytes to a preview sink. The file
//! sink materializes the bytes as a local file (the equivalent of an object
//! URL) and announces it on the event bus.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::events::{self, SharedEventSink, PREVIEW_SELECTED};
use crate::models::{segment::extension_for_mime, PredictionResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSource {
    pub result_id: String,
    pub video_name: String,
    /// `None` when the result has no source bytes (e.g. loaded from history).
    pub path: Option<PathBuf>,
}

pub trait PreviewSink: Send + Sync {
    fn show(&self, result: &PredictionResult) -> Result<PreviewSource>;
    fn clear(&self);
}

pub struct FilePreviewSink {
    dir: PathBuf,
    events: SharedEventSink,
}

impl FilePreviewSink {
    pub fn new(dir: PathBuf, events: SharedEventSink) -> Self {
        Self { dir, events }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_blob(&self, result: &PredictionResult) -> Result<Option<PathBuf>> {
        let Some(blob) = result.source_blob.as_ref() else {
            return Ok(None);
        };

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create preview dir {}", self.dir.display()))?;
        let path = self
            .dir
            .join(format!("{}.{}", result.id, extension_for_mime(&blob.mime_type)));
        if !path.exists() {
            fs::write(&path, &blob.bytes[..])
                .with_context(|| format!("failed to write preview {}", path.display()))?;
        }
        Ok(Some(path))
    }
}

impl PreviewSink for FilePreviewSink {
    fn show(&self, result: &PredictionResult) -> Result<PreviewSource> {
        let source = PreviewSource {
            result_id: result.id.clone(),
            video_name: result.video_name.clone(),
            path: self.write_blob(result)?,
        };
        events::emit(self.events.as_ref(), PREVIEW_SELECTED, &Some(&source));
        Ok(source)
    }

    fn clear(&self) {
        events::emit(self.events.as_ref(), PREVIEW_SELECTED, &None::<PreviewSource>);
    }
}
