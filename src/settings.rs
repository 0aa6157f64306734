use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

pub const DEFAULT_API_URL: &str = "http://localhost:5001";
pub const DEFAULT_SEGMENT_SECS: u64 = 30;
pub const MAX_SEGMENT_SECS: u64 = 3600;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Recording encodings, most preferred first.
pub const DEFAULT_MIME_PREFERENCES: [&str; 4] = [
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp8",
    "video/webm",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub segment_length_secs: u64,
    /// Platform device name; `None` picks the first camera.
    pub camera_device: Option<String>,
    pub record_audio: bool,
    pub mime_preferences: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            segment_length_secs: DEFAULT_SEGMENT_SECS,
            camera_device: None,
            record_audio: true,
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|mime| mime.to_string())
                .collect(),
        }
    }
}

impl CaptureSettings {
    pub fn segment_length(&self) -> Duration {
        Duration::from_secs(self.segment_length_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: 300,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ApiSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub api: ApiSettings,
    pub capture: CaptureSettings,
}

impl UserSettings {
    /// Apply `DEEPLIE_API_URL` and `DEEPLIE_SEGMENT_SECS` on top of the
    /// persisted values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DEEPLIE_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }

        if let Ok(raw) = std::env::var("DEEPLIE_SEGMENT_SECS") {
            self.capture.segment_length_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("DEEPLIE_SEGMENT_SECS is not a number: {raw}"))?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.segment_length_secs == 0 {
            return Err(anyhow!("segment length must be greater than zero"));
        }
        if self.capture.segment_length_secs > MAX_SEGMENT_SECS {
            return Err(anyhow!(
                "segment length must be at most {MAX_SEGMENT_SECS}s, got {}s",
                self.capture.segment_length_secs
            ));
        }
        if self.api.poll_interval_ms == 0 {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(anyhow!("api base url must be http(s): {}", self.api.base_url));
        }
        Ok(())
    }
}

pub fn debug_mode() -> bool {
    std::env::var("DEEPLIE_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.snapshot();

        assert_eq!(settings.api.base_url, DEFAULT_API_URL);
        assert_eq!(settings.api.poll_interval_ms, 500);
        assert_eq!(settings.api.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(settings.capture.mime_preferences[0], "video/webm;codecs=vp9,opus");
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.snapshot();
        settings.capture.segment_length_secs = 10;
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.snapshot().capture.segment_length_secs, 10);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "api": { "base_url": "https://lie.example" } }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().snapshot();
        assert_eq!(settings.api.base_url, "https://lie.example");
        assert_eq!(settings.capture.segment_length_secs, DEFAULT_SEGMENT_SECS);
    }

    #[test]
    fn zero_segment_length_is_rejected() {
        let mut settings = UserSettings::default();
        settings.capture.segment_length_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn segment_length_is_capped() {
        let mut settings = UserSettings::default();
        settings.capture.segment_length_secs = MAX_SEGMENT_SECS;
        assert!(settings.validate().is_ok());

        settings.capture.segment_length_secs = u64::MAX;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("at most 3600s"));
    }
}
