pub mod prediction;
pub mod segment;
pub mod session;

pub use prediction::{ConfidencePoint, Emotion, PredictionResult, SourceBlob, Verdict, Visualization};
pub use segment::{SegmentSource, VideoSegment};
pub use session::{CaptureSessionRecord, SessionStatus};
