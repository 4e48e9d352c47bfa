//! Backend interface.
//!
//! Everything the editor needs from the annotation backend goes through
//! [`AnnotationBackend`], so sessions can run against the HTTP client or an
//! in-memory double.

use std::path::Path;

use async_trait::async_trait;

use crate::api::types::{
    ExportFormat, ExportPayload, ExportSummary, SaveAnnotationsResponse, StatusResponse,
    UploadResponse, VideoInfo,
};
use crate::constants::UPLOAD_EXTENSIONS;
use crate::timing::FrameIndex;
use crate::wire::{
    ActionPayload, AnnotationsPayload, FramePayload, ObjectPayload, ObjectTrackPayload, PosePayload,
    PoseTrackPayload,
};

/// Errors from the backend API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status code.
    #[error("Backend error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Processing did not finish within the allowed number of status checks.
    #[error("Processing still not finished after {attempts} status checks")]
    Timeout {
        /// Status checks made.
        attempts: u32,
    },

    /// Waiting was cancelled by the caller.
    #[error("Cancelled")]
    Cancelled,

    /// The backend reported that processing failed.
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// The file is not a video type the backend accepts.
    #[error("Unsupported video file '{0}' (expected .mp4, .avi or .mov)")]
    UnsupportedFile(String),

    /// Reading the upload from disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Request-level failures the user can retry by hand.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Status { .. } | ApiError::Timeout { .. }
        )
    }

    /// Failures that may go away when the same request is repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// The backend does not know the resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// The annotation backend's REST surface.
///
/// Frames are zero-based here; implementations convert to the backend's
/// `frame_NNN` keys themselves.
#[async_trait]
pub trait AnnotationBackend: Send + Sync {
    /// Upload a video file and start processing.
    async fn upload(&self, path: &Path) -> Result<UploadResponse, ApiError>;

    async fn status(&self, video_id: &str) -> Result<StatusResponse, ApiError>;

    async fn info(&self, video_id: &str) -> Result<VideoInfo, ApiError>;

    async fn get_pose(&self, video_id: &str) -> Result<PoseTrackPayload, ApiError>;

    async fn get_objects(&self, video_id: &str) -> Result<ObjectTrackPayload, ApiError>;

    async fn get_actions(&self, video_id: &str) -> Result<Vec<ActionPayload>, ApiError>;

    /// Everything stored for one frame, with the action segments covering it.
    async fn get_frame(&self, video_id: &str, frame: FrameIndex) -> Result<FramePayload, ApiError>;

    /// Replace whole tracks in one request. Missing or empty tracks are left
    /// untouched.
    async fn save_annotations(
        &self,
        video_id: &str,
        annotations: &AnnotationsPayload,
    ) -> Result<SaveAnnotationsResponse, ApiError>;

    /// Replace one frame's pose.
    async fn put_pose(&self, video_id: &str, frame: FrameIndex, pose: &PosePayload) -> Result<(), ApiError>;

    /// Replace one frame's object list.
    async fn put_objects(
        &self,
        video_id: &str,
        frame: FrameIndex,
        objects: &[ObjectPayload],
    ) -> Result<(), ApiError>;

    /// Append one action segment; the backend keeps its list sorted.
    async fn add_action(&self, video_id: &str, action: &ActionPayload) -> Result<(), ApiError>;

    /// Remove one action segment by position.
    async fn delete_action(&self, video_id: &str, index: usize) -> Result<(), ApiError>;

    async fn export(&self, video_id: &str, format: ExportFormat) -> Result<ExportPayload, ApiError>;

    async fn export_summary(&self, video_id: &str) -> Result<ExportSummary, ApiError>;

    /// URL of the raw video for playback.
    fn video_url(&self, video_id: &str) -> String;
}

/// Check that `path` has an extension the backend accepts.
pub fn validate_upload_path(path: &Path) -> Result<(), ApiError> {
    let accepted = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| UPLOAD_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)));
    if accepted {
        Ok(())
    } else {
        Err(ApiError::UnsupportedFile(path.display().to_string()))
    }
}

/// MIME type sent with an upload.
pub fn video_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        _ => "video/mp4",
    }
}
