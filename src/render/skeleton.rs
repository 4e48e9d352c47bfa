//! Body skeleton graph over COCO-style landmark names.

use crate::model::PoseFrame;

/// Joint pairs connected by a bone.
pub const CONNECTIONS: [(&str, &str); 18] = [
    // Face
    ("nose", "left_eye"),
    ("nose", "right_eye"),
    ("left_eye", "left_ear"),
    ("right_eye", "right_ear"),
    ("nose", "left_shoulder"),
    ("nose", "right_shoulder"),
    // Arms
    ("left_shoulder", "right_shoulder"),
    ("left_shoulder", "left_elbow"),
    ("left_elbow", "left_wrist"),
    ("right_shoulder", "right_elbow"),
    ("right_elbow", "right_wrist"),
    // Torso
    ("left_shoulder", "left_hip"),
    ("right_shoulder", "right_hip"),
    ("left_hip", "right_hip"),
    // Legs
    ("left_hip", "left_knee"),
    ("left_knee", "left_ankle"),
    ("right_hip", "right_knee"),
    ("right_knee", "right_ankle"),
];

/// Landmarks labelled on screen when not being dragged.
pub const LABELLED: [&str; 5] = ["nose", "left_wrist", "right_wrist", "left_ankle", "right_ankle"];

pub fn is_labelled(name: &str) -> bool {
    LABELLED.contains(&name)
}

/// Bones of `pose` whose endpoints are both present.
pub fn present_connections(pose: &PoseFrame) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
    CONNECTIONS
        .iter()
        .copied()
        .filter(|(a, b)| pose.get(a).is_some() && pose.get(b).is_some())
}
