//! Native camera capture through an `ffmpeg` subprocess.
//!
//! Each recording cycle is one ffmpeg process writing a finished container
//! to stdout. Stopping sends `q` on stdin so the muxer writes its trailer.

use std::{
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinHandle,
};
use uuid::Uuid;

use super::platform::{
    CaptureConstraints, CaptureError, MediaPlatform, MediaRecorder, MediaStream,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "capture::ffmpeg";

use crate::{log_info, log_warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);
/// Container used when no preferred type is supported.
const DEFAULT_CONTAINER_MIME: &str = "video/x-matroska";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EncoderSupport {
    vp9: bool,
    vp8: bool,
    opus: bool,
}

impl EncoderSupport {
    fn from_listing(listing: &str) -> Self {
        let has = |name: &str| {
            listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name))
        };
        Self {
            vp9: has("libvpx-vp9"),
            vp8: has("libvpx"),
            opus: has("libopus"),
        }
    }

    fn encoder_for(&self, codec: &str) -> Option<&'static str> {
        match codec {
            "vp9" if self.vp9 => Some("libvpx-vp9"),
            "vp8" if self.vp8 => Some("libvpx"),
            "opus" if self.opus => Some("libopus"),
            _ => None,
        }
    }
}

/// Output plan for a MIME type such as `video/webm;codecs=vp8,opus`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputFormat {
    mime_type: String,
    muxer: &'static str,
    video_encoder: Option<&'static str>,
    audio_encoder: Option<&'static str>,
}

impl OutputFormat {
    fn for_mime(mime_type: &str, encoders: &EncoderSupport) -> Option<Self> {
        let mut parts = mime_type.split(';');
        let container = parts.next()?.trim();
        if container != "video/webm" {
            return None;
        }

        let codecs: Vec<String> = parts
            .filter_map(|param| param.trim().strip_prefix("codecs="))
            .flat_map(|list| list.trim_matches('"').split(','))
            .map(|codec| codec.trim().to_ascii_lowercase())
            .filter(|codec| !codec.is_empty())
            .collect();

        let mut video_encoder = None;
        let mut audio_encoder = None;
        for codec in &codecs {
            let encoder = encoders.encoder_for(codec)?;
            if codec == "opus" {
                audio_encoder = Some(encoder);
            } else {
                video_encoder = Some(encoder);
            }
        }
        let video_encoder = match video_encoder {
            Some(encoder) => encoder,
            None => encoders
                .encoder_for("vp8")
                .or_else(|| encoders.encoder_for("vp9"))?,
        };

        Some(Self {
            mime_type: mime_type.to_string(),
            muxer: "webm",
            video_encoder: Some(video_encoder),
            audio_encoder: audio_encoder.or(encoders.encoder_for("opus")),
        })
    }

    fn platform_default() -> Self {
        Self {
            mime_type: DEFAULT_CONTAINER_MIME.to_string(),
            muxer: "matroska",
            video_encoder: None,
            audio_encoder: None,
        }
    }
}

pub struct FfmpegPlatform {
    binary: PathBuf,
    encoders: Option<EncoderSupport>,
}

impl FfmpegPlatform {
    /// Probe `binary` once for its encoder list. A missing or broken ffmpeg
    /// leaves the platform without recording support.
    pub fn probe(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let encoders = match std::process::Command::new(&binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) if output.status.success() => {
                let support = EncoderSupport::from_listing(&String::from_utf8_lossy(&output.stdout));
                log_info!("ffmpeg encoders: {support:?}");
                Some(support)
            }
            Ok(output) => {
                log_warn!("ffmpeg -encoders exited with {}", output.status);
                None
            }
            Err(err) => {
                log_warn!("ffmpeg not available at {}: {err}", binary.display());
                None
            }
        };
        Self { binary, encoders }
    }
}

#[async_trait]
impl MediaPlatform for FfmpegPlatform {
    fn recording_available(&self) -> bool {
        self.encoders.is_some()
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.encoders
            .as_ref()
            .is_some_and(|encoders| OutputFormat::for_mime(mime_type, encoders).is_some())
    }

    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError> {
        let Some(encoders) = self.encoders else {
            return Err(CaptureError::RecordingUnsupported(
                "ffmpeg was not found".to_string(),
            ));
        };
        let input_args = input_args(constraints)?;
        check_device(constraints)?;

        Ok(Arc::new(FfmpegStream {
            id: Uuid::new_v4().to_string(),
            binary: self.binary.clone(),
            input_args,
            encoders,
            active: AtomicBool::new(true),
        }))
    }
}

#[cfg(target_os = "linux")]
fn input_args(constraints: &CaptureConstraints) -> Result<Vec<String>, CaptureError> {
    let device = constraints.device.as_deref().unwrap_or("/dev/video0");
    let mut args = vec!["-f".into(), "v4l2".into(), "-i".into(), device.into()];
    if constraints.audio {
        args.extend(["-f".into(), "alsa".into(), "-i".into(), "default".into()]);
    }
    Ok(args)
}

#[cfg(target_os = "macos")]
fn input_args(constraints: &CaptureConstraints) -> Result<Vec<String>, CaptureError> {
    let video = constraints.device.as_deref().unwrap_or("0");
    let input = if constraints.audio {
        format!("{video}:0")
    } else {
        format!("{video}:none")
    };
    Ok(vec!["-f".into(), "avfoundation".into(), "-i".into(), input])
}

#[cfg(target_os = "windows")]
fn input_args(constraints: &CaptureConstraints) -> Result<Vec<String>, CaptureError> {
    let device = constraints.device.as_deref().ok_or_else(|| {
        CaptureError::DeviceUnavailable("set capture.camera_device to a DirectShow device name".into())
    })?;
    Ok(vec!["-f".into(), "dshow".into(), "-i".into(), format!("video={device}")])
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn input_args(_constraints: &CaptureConstraints) -> Result<Vec<String>, CaptureError> {
    Err(CaptureError::RecordingUnsupported(
        "no camera input for this operating system".into(),
    ))
}

/// Open the device node once so permission problems surface before recording.
#[cfg(target_os = "linux")]
fn check_device(constraints: &CaptureConstraints) -> Result<(), CaptureError> {
    let device = constraints.device.as_deref().unwrap_or("/dev/video0");
    match std::fs::File::open(device) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(CaptureError::PermissionDenied(format!("{device}: {err}")))
        }
        Err(err) => Err(CaptureError::DeviceUnavailable(format!("{device}: {err}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn check_device(_constraints: &CaptureConstraints) -> Result<(), CaptureError> {
    Ok(())
}

struct FfmpegStream {
    id: String,
    binary: PathBuf,
    input_args: Vec<String>,
    encoders: EncoderSupport,
    active: AtomicBool,
}

impl MediaStream for FfmpegStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn create_recorder(&self, mime_type: Option<&str>) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        if !self.is_active() {
            return Err(CaptureError::StreamEnded);
        }
        let format = mime_type
            .and_then(|mime| OutputFormat::for_mime(mime, &self.encoders))
            .unwrap_or_else(OutputFormat::platform_default);

        Ok(Box::new(FfmpegRecorder {
            binary: self.binary.clone(),
            args: build_args(&self.input_args, &format),
            mime_type: format.mime_type,
            running: None,
        }))
    }

    fn stop_tracks(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log_info!("camera stream {} released", self.id);
        }
    }
}

fn build_args(input_args: &[String], format: &OutputFormat) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(input_args.iter().cloned());
    if let Some(encoder) = format.video_encoder {
        args.extend(["-c:v".into(), encoder.into(), "-deadline".into(), "realtime".into()]);
    }
    if let Some(encoder) = format.audio_encoder {
        args.extend(["-c:a".into(), encoder.into()]);
    }
    args.extend(["-f".into(), format.muxer.into(), "pipe:1".into()]);
    args
}

/// Kill an ffmpeg process and reap it. Returns whether the kill succeeded.
async fn kill_process(child: &mut Child) -> bool {
    match child.kill().await {
        Ok(()) => true,
        Err(err) => {
            log_warn!("failed to kill ffmpeg: {err}");
            false
        }
    }
}

struct RunningProcess {
    child: Child,
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
}

struct FfmpegRecorder {
    binary: PathBuf,
    args: Vec<String>,
    mime_type: String,
    running: Option<RunningProcess>,
}

#[async_trait]
impl MediaRecorder for FfmpegRecorder {
    fn mime_type(&self) -> Option<&str> {
        Some(&self.mime_type)
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CaptureError::Recorder(format!("failed to spawn ffmpeg: {err}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Recorder("ffmpeg stdout unavailable".into()))?;
        // Drain continuously so a full pipe never stalls the encoder.
        let reader = tokio::spawn(async move {
            let mut bytes = Vec::new();
            stdout.read_to_end(&mut bytes).await?;
            Ok(bytes)
        });

        self.running = Some(RunningProcess { child, reader });
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        let Some(RunningProcess { mut child, reader }) = self.running.take() else {
            return Err(CaptureError::Recorder("recorder was not started".into()));
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(b"q\n").await {
                log_warn!("failed to signal ffmpeg: {err}");
            }
        }

        let status = match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => return Err(CaptureError::Recorder(err.to_string())),
            Err(_) => {
                log_warn!("ffmpeg did not exit within {STOP_TIMEOUT:?}, killing");
                kill_process(&mut child).await;
                None
            }
        };

        let bytes = match reader.await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => return Err(CaptureError::Recorder(err.to_string())),
            Err(err) => return Err(CaptureError::Recorder(err.to_string())),
        };

        match status {
            Some(status) if !status.success() && bytes.is_empty() => Err(CaptureError::Recorder(
                format!("ffmpeg exited with {status}"),
            )),
            _ => Ok(bytes),
        }
    }

    async fn abort(&mut self) {
        if let Some(RunningProcess { mut child, reader }) = self.running.take() {
            kill_process(&mut child).await;
            reader.abort();
        }
    }
}
