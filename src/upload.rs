//! Client-side validation of user-selected video files.
//!
//! Validation runs before any bytes are read into memory and before any
//! network call; a rejected file has no side effects.

use std::path::Path;

use thiserror::Error;

use crate::models::VideoSegment;

#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("Please select a valid video file.")]
    NotAVideo,
    #[error("File is too large. Please select a video under {limit_mb}MB.")]
    TooLarge { size: u64, limit_mb: u64 },
    #[error("Could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Video MIME type for a file name, judged by extension.
pub fn video_mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        "mpeg" | "mpg" => "video/mpeg",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// Check type and size. Returns the MIME type to send with the file.
pub fn validate_upload(path: &Path, size: u64, max_bytes: u64) -> Result<&'static str, UploadError> {
    let mime = video_mime_for(path).ok_or(UploadError::NotAVideo)?;
    if size > max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit_mb: max_bytes / (1024 * 1024),
        });
    }
    Ok(mime)
}

/// Validate `path` and load it as a segment ready for submission.
pub async fn handle_file_select(path: &Path, max_bytes: u64) -> Result<VideoSegment, UploadError> {
    let unreadable = |err: std::io::Error| UploadError::Unreadable {
        path: path.display().to_string(),
        reason: err.to_string(),
    };

    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    if !metadata.is_file() {
        return Err(UploadError::NotAVideo);
    }
    let mime = validate_upload(path, metadata.len(), max_bytes)?;

    let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Ok(VideoSegment::from_upload(bytes, mime, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const LIMIT: u64 = 100 * 1024 * 1024;

    #[test]
    fn rejects_non_video_extensions() {
        assert_eq!(
            validate_upload(&PathBuf::from("notes.txt"), 10, LIMIT),
            Err(UploadError::NotAVideo)
        );
        assert_eq!(
            validate_upload(&PathBuf::from("no_extension"), 10, LIMIT),
            Err(UploadError::NotAVideo)
        );
    }

    #[test]
    fn rejects_files_over_the_limit() {
        let err = validate_upload(&PathBuf::from("big.mp4"), 150 * 1024 * 1024, LIMIT).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File is too large. Please select a video under 100MB."
        );
    }

    #[test]
    fn accepts_exactly_the_limit() {
        assert_eq!(
            validate_upload(&PathBuf::from("Clip.MOV"), LIMIT, LIMIT),
            Ok("video/quicktime")
        );
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.mp4");
        let file = std::fs::File::create(&path).unwrap();
        // Sparse file: reported as 150MB without writing the bytes.
        file.set_len(150 * 1024 * 1024).unwrap();

        let err = handle_file_select(&path, LIMIT).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn accepted_file_becomes_upload_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.webm");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let segment = handle_file_select(&path, LIMIT).await.unwrap();
        assert_eq!(segment.source_name, "answer.webm");
        assert_eq!(segment.mime_type, "video/webm");
        assert_eq!(segment.len(), 4);
        assert!(segment.session_id.is_none());
    }
}
