//! Editing tools.

use serde::{Deserialize, Serialize};

/// Annotation layer the editor is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Skeleton keypoints
    #[default]
    Pose,
    /// Bounding boxes
    Objects,
    /// Action segments
    Actions,
}

impl Tool {
    /// Get the display name for this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Pose => "Pose",
            Tool::Objects => "Objects",
            Tool::Actions => "Actions",
        }
    }

    /// Get all available tools.
    pub fn all() -> &'static [Tool] {
        &[Tool::Pose, Tool::Objects, Tool::Actions]
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pose" => Ok(Tool::Pose),
            "objects" | "object" => Ok(Tool::Objects),
            "actions" | "action" => Ok(Tool::Actions),
            other => Err(format!("unknown tool '{}'", other)),
        }
    }
}
