pub mod api;
pub mod client;
pub mod progress;

pub use api::{ApiError, HttpPredictionApi, PredictResponse, PredictionApi};
pub use client::SubmissionClient;
pub use progress::{ProgressBoard, ProgressUpdate};
