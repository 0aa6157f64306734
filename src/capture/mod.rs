pub mod commands;
pub mod controller;
pub mod ffmpeg;
pub mod platform;
pub mod recorder;
pub mod state;

pub use controller::CaptureController;
pub use ffmpeg::FfmpegPlatform;
pub use platform::{CaptureConstraints, CaptureError, MediaPlatform, MediaRecorder, MediaStream};
pub use state::{CaptureState, CaptureStatus, InputMode};
