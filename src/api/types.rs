//! Response bodies of the backend endpoints that are not annotation tracks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `POST /api/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub video_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub status: Option<ProcessingStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Processing state of an uploaded video.
///
/// Sent over the wire as a bare string: `queued`, `processing`, `completed`
/// or `error: <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStatus {
    Queued,
    Processing,
    Completed,
    Failed(String),
    /// Any other status string
    Unknown(String),
}

impl ProcessingStatus {
    /// No further change is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed(_))
    }
}

impl FromStr for ProcessingStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "queued" => ProcessingStatus::Queued,
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            _ => match s.strip_prefix("error") {
                Some(rest) => {
                    let message = rest.trim_start_matches(':').trim();
                    ProcessingStatus::Failed(message.to_string())
                }
                None => ProcessingStatus::Unknown(s.to_string()),
            },
        })
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Queued => write!(f, "queued"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed(message) => write!(f, "error: {}", message),
            ProcessingStatus::Unknown(other) => write!(f, "{}", other),
        }
    }
}

impl Serialize for ProcessingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProcessingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(status) = raw.parse::<ProcessingStatus>();
        Ok(status)
    }
}

/// `GET /api/video/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub video_id: String,
    pub status: ProcessingStatus,
}

/// `GET /api/video/{id}/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub has_pose: bool,
    pub has_objects: bool,
    pub has_actions: bool,
    /// Number of pose frames, used as the video length when known.
    pub frame_count: u32,
    pub status: ProcessingStatus,
}

/// `POST /api/video/{id}/annotations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnnotationsResponse {
    #[serde(default)]
    pub message: String,
    /// Tracks the backend wrote
    #[serde(default)]
    pub saved: Vec<String>,
}

/// Export formats produced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Yaml,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Yaml => "yaml",
        }
    }

    /// File extension, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => ".json",
            ExportFormat::Csv => ".csv",
            ExportFormat::Yaml => ".yaml",
        }
    }

    /// Default file name of an export of `video_id`.
    pub fn file_name(&self, video_id: &str) -> String {
        format!("video_{}_data{}", video_id, self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(format!("Unsupported export format '{}'", other)),
        }
    }
}

/// An export blob as delivered by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload {
    pub format: ExportFormat,
    /// `Content-Type` reported by the backend, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// `GET /api/video/{id}/export/summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub video_id: String,
    #[serde(default)]
    pub available_formats: Vec<ExportFormat>,
    #[serde(default)]
    pub available_data: AvailableData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvailableData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<ObjectAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ActionAvailability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseAvailability {
    pub frame_count: usize,
    pub keypoint_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAvailability {
    pub frame_count: usize,
    pub total_detections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAvailability {
    pub action_count: usize,
    #[serde(default)]
    pub action_types: Vec<String>,
}
