//! Backend payload shapes and their conversion to the document model.
//!
//! The backend keys frames as `frame_NNN`, counting from 1, and numbers action
//! ranges from 1 as well. Everything inside the crate counts from 0; the
//! conversion happens here and nowhere else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::DEFAULT_CONFIDENCE;
use crate::coords::{SourcePoint, SourceSpace};
use crate::model::{
    ActionSegment, AnnotationDocument, BoundingBox, DetectedObject, DocumentError, Keypoint,
    ObjectTrack, PoseFrame, PoseTrack,
};
use crate::timing::FrameIndex;

/// Errors converting a single backend item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    /// Frame key not of the form `frame_<n>` with `n >= 1`
    #[error("Invalid frame key '{0}'")]
    InvalidFrameKey(String),

    /// Keypoint with fewer than two coordinates
    #[error("Keypoint '{name}' has {len} values, expected at least 2")]
    ShortKeypoint {
        /// Landmark name
        name: String,
        /// Number of values received
        len: usize,
    },

    /// Action numbered from 0 although the backend counts from 1
    #[error("Action '{label}' starts at frame 0")]
    ZeroFrame {
        /// Action label
        label: String,
    },

    /// Action with an invalid range
    #[error(transparent)]
    Document(#[from] DocumentError),
}

// ============================================================================
// Frame keys
// ============================================================================

/// Backend key of a zero-based frame: `frame_001` for frame 0.
pub fn frame_key(frame: FrameIndex) -> String {
    format!("frame_{:03}", frame as u64 + 1)
}

/// Zero-based frame of a backend key.
pub fn parse_frame_key(key: &str) -> Result<FrameIndex, WireError> {
    let invalid = || WireError::InvalidFrameKey(key.to_string());
    let digits = key.strip_prefix("frame_").ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let number: u64 = digits.parse().map_err(|_| invalid())?;
    number
        .checked_sub(1)
        .and_then(|f| FrameIndex::try_from(f).ok())
        .ok_or_else(invalid)
}

// ============================================================================
// Payloads
// ============================================================================

/// One frame of `GET /pose`, and the body of `PUT /pose/{frame}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosePayload {
    /// `name -> [x, y]`, `[x, y, z]` or `[x, y, z, confidence]`.
    pub keypoints: BTreeMap<String, Vec<f32>>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// One detection of `GET /objects`, and an item of `PUT /objects/{frame}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPayload {
    pub label: String,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// One item of `GET /actions`, and the body of `POST /actions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub label: String,
    /// One-based, inclusive
    pub start_frame: u32,
    /// One-based, inclusive
    pub end_frame: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

pub type PoseTrackPayload = BTreeMap<String, PosePayload>;
pub type ObjectTrackPayload = BTreeMap<String, Vec<ObjectPayload>>;

/// `GET /frame/{n}`: what the backend stores for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// One-based, as in the request path
    pub frame: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<PosePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectPayload>>,
    /// Segments covering the frame
    #[serde(default)]
    pub actions: Vec<ActionPayload>,
}

/// Body of `POST /annotations`.
///
/// Replaces whole tracks at once. The backend leaves a track alone when its
/// field is missing or empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseTrackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<ObjectTrackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionPayload>>,
}

impl AnnotationsPayload {
    /// Track names that would be written, in backend order.
    pub fn tracks(&self) -> Vec<&'static str> {
        let mut tracks = Vec::new();
        if self.pose.as_ref().is_some_and(|p| !p.is_empty()) {
            tracks.push("pose");
        }
        if self.objects.as_ref().is_some_and(|o| !o.is_empty()) {
            tracks.push("objects");
        }
        if self.actions.as_ref().is_some_and(|a| !a.is_empty()) {
            tracks.push("actions");
        }
        tracks
    }
}

// ============================================================================
// Inbound
// ============================================================================

impl PosePayload {
    /// Convert to a pose frame with positions in `space`.
    pub fn to_frame(&self, space: SourceSpace) -> Result<PoseFrame, WireError> {
        let mut pose = PoseFrame::new(self.confidence);
        for (name, values) in &self.keypoints {
            let (x, y) = match values.as_slice() {
                [x, y, ..] => (*x, *y),
                _ => {
                    return Err(WireError::ShortKeypoint {
                        name: name.clone(),
                        len: values.len(),
                    });
                }
            };
            let z = values.get(2).copied().unwrap_or(0.0);
            let confidence = values.get(3).copied().unwrap_or(self.confidence);
            let keypoint = Keypoint::new(SourcePoint::in_space(space, x, y), confidence).with_z(z);
            pose.keypoints.insert(name.clone(), keypoint);
        }
        Ok(pose)
    }

    fn coords(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.keypoints
            .values()
            .filter_map(|v| Some((*v.first()?, *v.get(1)?)))
    }
}

impl ObjectPayload {
    pub fn to_object(&self, space: SourceSpace) -> DetectedObject {
        let [x1, y1, x2, y2] = self.bbox;
        DetectedObject::new(
            self.label.clone(),
            BoundingBox::from_corners(x1, y1, x2, y2),
            self.confidence,
        )
        .in_space(space)
    }
}

impl ActionPayload {
    pub fn to_segment(&self) -> Result<ActionSegment, WireError> {
        if self.start_frame == 0 || self.end_frame == 0 {
            return Err(WireError::ZeroFrame {
                label: self.label.clone(),
            });
        }
        Ok(ActionSegment::new(
            self.label.clone(),
            self.start_frame - 1,
            self.end_frame - 1,
            self.confidence,
        )?)
    }
}

/// Convert a pose track, skipping malformed frames.
///
/// `space` is the declared space of the payload; `None` means the payload
/// declares nothing and it is detected once for the whole track.
pub fn pose_track_from_wire(payload: &PoseTrackPayload, space: Option<SourceSpace>) -> PoseTrack {
    let space = space.unwrap_or_else(|| SourceSpace::detect(payload.values().flat_map(PosePayload::coords)));
    log::debug!("Pose track: {} frames in {:?} space", payload.len(), space);

    payload
        .iter()
        .filter_map(|(key, frame)| {
            let converted = parse_frame_key(key).and_then(|f| Ok((f, frame.to_frame(space)?)));
            match converted {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping pose entry '{}': {}", key, e);
                    None
                }
            }
        })
        .collect()
}

/// Convert an object track, skipping malformed frame keys.
pub fn object_track_from_wire(
    payload: &ObjectTrackPayload,
    space: Option<SourceSpace>,
) -> ObjectTrack {
    let space = space.unwrap_or_else(|| {
        SourceSpace::detect(payload.values().flatten().flat_map(|o| {
            let [x1, y1, x2, y2] = o.bbox;
            [(x1, y1), (x2, y2)]
        }))
    });
    log::debug!("Object track: {} frames in {:?} space", payload.len(), space);

    payload
        .iter()
        .filter_map(|(key, objects)| match parse_frame_key(key) {
            Ok(frame) => Some((frame, objects.iter().map(|o| o.to_object(space)).collect())),
            Err(e) => {
                log::warn!("Skipping object entry '{}': {}", key, e);
                None
            }
        })
        .collect()
}

/// Convert an action list, skipping invalid segments.
pub fn actions_from_wire(payload: &[ActionPayload]) -> Vec<ActionSegment> {
    payload
        .iter()
        .filter_map(|a| match a.to_segment() {
            Ok(segment) => Some(segment),
            Err(e) => {
                log::warn!("Skipping action '{}': {}", a.label, e);
                None
            }
        })
        .collect()
}

/// Assemble a document from the three backend payloads.
pub fn document_from_wire(
    pose: &PoseTrackPayload,
    objects: &ObjectTrackPayload,
    actions: &[ActionPayload],
    spaces: WireSpaces,
) -> AnnotationDocument {
    AnnotationDocument::from_parts(
        pose_track_from_wire(pose, spaces.pose),
        object_track_from_wire(objects, spaces.objects),
        actions_from_wire(actions),
    )
}

/// Declared coordinate spaces of the backend tracks. `None` means detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireSpaces {
    pub pose: Option<SourceSpace>,
    pub objects: Option<SourceSpace>,
}

// ============================================================================
// Outbound
// ============================================================================

impl From<&PoseFrame> for PosePayload {
    fn from(pose: &PoseFrame) -> Self {
        let keypoints = pose
            .keypoints
            .iter()
            .map(|(name, kp)| {
                let (x, y) = kp.position.xy();
                (name.clone(), vec![x, y, kp.z])
            })
            .collect();
        Self {
            keypoints,
            confidence: pose.confidence,
        }
    }
}

impl From<&DetectedObject> for ObjectPayload {
    fn from(object: &DetectedObject) -> Self {
        Self {
            label: object.label.clone(),
            bbox: object.bbox.corners(),
            confidence: object.confidence,
        }
    }
}

impl From<&ActionSegment> for ActionPayload {
    fn from(segment: &ActionSegment) -> Self {
        Self {
            label: segment.label.clone(),
            start_frame: segment.start.saturating_add(1),
            end_frame: segment.end.saturating_add(1),
            confidence: segment.confidence,
        }
    }
}

/// Every non-empty track of a document, keyed the way the backend stores it.
impl From<&AnnotationDocument> for AnnotationsPayload {
    fn from(document: &AnnotationDocument) -> Self {
        let pose: PoseTrackPayload = document
            .pose()
            .iter()
            .map(|(frame, pose)| (frame_key(frame), PosePayload::from(pose)))
            .collect();
        let objects: ObjectTrackPayload = document
            .objects()
            .iter()
            .map(|(frame, objects)| (frame_key(frame), objects.iter().map(ObjectPayload::from).collect()))
            .collect();
        let actions: Vec<ActionPayload> = document.actions().iter().map(ActionPayload::from).collect();
        Self {
            pose: (!pose.is_empty()).then_some(pose),
            objects: (!objects.is_empty()).then_some(objects),
            actions: (!actions.is_empty()).then_some(actions),
        }
    }
}
