pub mod commands;
pub mod export;
pub mod preview;
pub mod store;

pub use preview::{FilePreviewSink, PreviewSink, PreviewSource};
pub use store::ResultStore;
