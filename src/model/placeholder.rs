//! Synthesized demo annotations.
//!
//! Used when the backend has nothing for a video, so the editor stays usable.
//! Three seconds of a swaying figure at reference resolution, two objects
//! refreshed every fifth frame and four back-to-back action segments.

use crate::coords::{Size, SourcePoint};
use crate::model::action::ActionSegment;
use crate::model::document::AnnotationDocument;
use crate::model::objects::{BoundingBox, DetectedObject, ObjectTrack};
use crate::model::pose::{Keypoint, PoseFrame, PoseTrack};
use crate::timing::FrameIndex;

/// Frames covered by the placeholder document.
pub const PLACEHOLDER_FRAMES: u32 = 90;

/// Object detections are synthesized on every n-th frame only.
const OBJECT_STRIDE: u32 = 5;

/// Offsets are authored against an 800×450 stage.
const STAGE_WIDTH: f32 = 800.0;

/// (name, dx, dy, confidence) relative to the figure centre, before sway.
/// Named after the COCO landmarks so the skeleton renderer can connect them.
const FIGURE: [(&str, f32, f32, f32); 13] = [
    ("nose", 0.0, -100.0, 0.95),
    ("left_shoulder", -40.0, -40.0, 0.92),
    ("right_shoulder", 40.0, -40.0, 0.93),
    ("left_elbow", -45.0, 10.0, 0.89),
    ("right_elbow", 45.0, 10.0, 0.91),
    ("left_wrist", -50.0, 60.0, 0.87),
    ("right_wrist", 50.0, 60.0, 0.88),
    ("left_hip", -20.0, 20.0, 0.96),
    ("right_hip", 20.0, 20.0, 0.96),
    ("left_knee", -20.0, 100.0, 0.90),
    ("right_knee", 20.0, 100.0, 0.91),
    ("left_ankle", -20.0, 160.0, 0.86),
    ("right_ankle", 20.0, 160.0, 0.87),
];

const ACTIONS: [(&str, u32, u32); 4] = [
    ("standing", 0, 25),
    ("reaching", 25, 45),
    ("grasping", 45, 65),
    ("lifting", 65, 89),
];

/// Build the placeholder document in reference pixels.
pub fn placeholder_document() -> AnnotationDocument {
    let reference = Size::reference();
    let k = reference.width / STAGE_WIDTH;
    let cx = reference.width / 2.0;
    let cy = reference.height / 2.0;

    let pose: PoseTrack = (0..PLACEHOLDER_FRAMES)
        .map(|frame| (frame, figure_at(frame, cx, cy, k)))
        .collect();

    let objects: ObjectTrack = (0..PLACEHOLDER_FRAMES)
        .step_by(OBJECT_STRIDE as usize)
        .map(|frame| (frame, objects_at(frame, k)))
        .collect();

    let actions = ACTIONS
        .iter()
        .filter_map(|(label, start, end)| ActionSegment::new(*label, *start, *end, 0.9).ok())
        .collect();

    AnnotationDocument::from_parts(pose, objects, actions)
}

fn figure_at(frame: FrameIndex, cx: f32, cy: f32, k: f32) -> PoseFrame {
    let t = frame as f32;
    let sway = (t * 0.1).sin() * 20.0;
    let arm = (t * 0.05).cos();

    let mut pose = PoseFrame::new(0.93);
    for (name, dx, dy, confidence) in FIGURE {
        // The left arm swings; everything else only sways.
        let swing = match name {
            "left_elbow" => arm * 20.0,
            "left_wrist" => arm * 30.0,
            _ => 0.0,
        };
        let x = cx + (dx + sway + swing) * k;
        let y = cy + dy * k;
        pose.keypoints.insert(
            name.to_string(),
            Keypoint::new(SourcePoint::Pixels { x, y }, confidence),
        );
    }
    pose
}

fn objects_at(frame: FrameIndex, k: f32) -> Vec<DetectedObject> {
    let drift = (frame as f32 * 0.05).sin() * 10.0;
    vec![
        DetectedObject::new(
            "cup",
            BoundingBox::new((150.0 + drift) * k, 280.0 * k, 80.0 * k, 100.0 * k),
            0.88,
        ),
        DetectedObject::new(
            "box",
            BoundingBox::new(500.0 * k, 200.0 * k, 120.0 * k, 150.0 * k),
            0.92,
        ),
    ]
}
