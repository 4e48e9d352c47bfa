//! Annotation backend: interface, HTTP client and processing status polling.

pub mod client;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod poll;
pub mod types;

pub use client::{AnnotationBackend, ApiError};
pub use http::HttpBackend;
pub use poll::{PollConfig, wait_for_processing};
pub use types::{
    ExportFormat, ExportPayload, ExportSummary, ProcessingStatus, SaveAnnotationsResponse,
    StatusResponse, UploadResponse, VideoInfo,
};
