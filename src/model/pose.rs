//! Pose keypoints and per-frame pose tracks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coords::{Point, Size, SourcePoint};
use crate::timing::FrameIndex;

/// A named body landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// 2D position, tagged with its coordinate space.
    pub position: SourcePoint,
    /// Depth, 0 when the detector gave none.
    #[serde(default)]
    pub z: f32,
    /// Detection confidence in `0..=1`.
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(position: SourcePoint, confidence: f32) -> Self {
        Self {
            position,
            z: 0.0,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Set the depth component.
    pub fn with_z(mut self, z: f32) -> Self {
        self.z = z;
        self
    }
}

/// All keypoints of one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Keypoints by landmark name.
    pub keypoints: BTreeMap<String, Keypoint>,
    /// Overall pose confidence.
    pub confidence: f32,
}

impl PoseFrame {
    pub fn new(confidence: f32) -> Self {
        Self {
            keypoints: BTreeMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Add a keypoint (builder style).
    pub fn with_keypoint(mut self, name: impl Into<String>, keypoint: Keypoint) -> Self {
        self.keypoints.insert(name.into(), keypoint);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.get(name)
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Keypoint positions in reference pixels, by name.
    pub fn reference_positions(&self, reference: Size) -> impl Iterator<Item = (&str, Point)> + '_ {
        self.keypoints
            .iter()
            .map(move |(name, kp)| (name.as_str(), kp.position.to_reference(reference)))
    }
}

/// Per-frame poses of one video. Frames without a detection are absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseTrack {
    frames: BTreeMap<FrameIndex, PoseFrame>,
}

impl PoseTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&PoseFrame> {
        self.frames.get(&frame)
    }

    pub fn get_mut(&mut self, frame: FrameIndex) -> Option<&mut PoseFrame> {
        self.frames.get_mut(&frame)
    }

    /// Get the frame, creating an empty one if absent.
    pub fn entry(&mut self, frame: FrameIndex, confidence: f32) -> &mut PoseFrame {
        self.frames
            .entry(frame)
            .or_insert_with(|| PoseFrame::new(confidence))
    }

    /// Replace the pose of a frame, returning the previous one.
    pub fn insert(&mut self, frame: FrameIndex, pose: PoseFrame) -> Option<PoseFrame> {
        self.frames.insert(frame, pose)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &PoseFrame)> {
        self.frames.iter().map(|(f, p)| (*f, p))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Highest frame with a pose.
    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.frames.keys().next_back().copied()
    }
}

impl FromIterator<(FrameIndex, PoseFrame)> for PoseTrack {
    fn from_iter<T: IntoIterator<Item = (FrameIndex, PoseFrame)>>(iter: T) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}
