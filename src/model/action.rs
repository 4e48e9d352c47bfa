//! Labelled action segments on the timeline.

use serde::{Deserialize, Serialize};

use crate::model::error::DocumentError;
use crate::timing::FrameIndex;

/// An activity spanning an inclusive frame range.
///
/// Segments may overlap; display code shows the first one active at a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSegment {
    pub label: String,
    /// First frame, inclusive.
    pub start: FrameIndex,
    /// Last frame, inclusive.
    pub end: FrameIndex,
    pub confidence: f32,
}

impl ActionSegment {
    /// Create a segment, rejecting `start > end`.
    pub fn new(
        label: impl Into<String>,
        start: FrameIndex,
        end: FrameIndex,
        confidence: f32,
    ) -> Result<Self, DocumentError> {
        let segment = Self {
            label: label.into(),
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
        };
        segment.validate()?;
        Ok(segment)
    }

    /// Check the frame range.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.start > self.end {
            return Err(DocumentError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Whether `frame` lies inside the segment.
    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.start <= frame && frame <= self.end
    }

    /// Number of frames covered.
    pub fn frame_count(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }
}
