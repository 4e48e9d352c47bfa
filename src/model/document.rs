//! In-memory annotation document for one video.
//!
//! Holds the pose track, object track and action list, keyed by zero-based
//! frame index. All edits are synchronous and local; persisting them is the
//! session's job.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::coords::SourcePoint;
use crate::model::action::ActionSegment;
use crate::model::error::DocumentError;
use crate::model::objects::{DetectedObject, ObjectTrack};
use crate::model::pose::{Keypoint, PoseFrame, PoseTrack};
use crate::timing::FrameIndex;

/// Confidence given to keypoints and poses placed by hand.
pub const MANUAL_CONFIDENCE: f32 = 1.0;

/// Pose, objects and actions of one video.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationDocument {
    pose: PoseTrack,
    objects: ObjectTrack,
    /// Sorted by start frame, ties in insertion order.
    actions: Vec<ActionSegment>,
}

impl AnnotationDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from loaded tracks. Actions are sorted by start frame.
    pub fn from_parts(pose: PoseTrack, objects: ObjectTrack, mut actions: Vec<ActionSegment>) -> Self {
        actions.sort_by_key(|a| a.start);
        Self {
            pose,
            objects,
            actions,
        }
    }

    /// True when no track holds any data.
    pub fn is_empty(&self) -> bool {
        self.pose.is_empty() && self.objects.is_empty() && self.actions.is_empty()
    }

    pub fn pose(&self) -> &PoseTrack {
        &self.pose
    }

    pub fn objects(&self) -> &ObjectTrack {
        &self.objects
    }

    pub fn actions(&self) -> &[ActionSegment] {
        &self.actions
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Pose at exactly `frame`. Poses never fall back to other frames.
    pub fn get_pose(&self, frame: FrameIndex) -> Option<&PoseFrame> {
        self.pose.get(frame)
    }

    /// Objects shown at `frame`: the list of the nearest populated frame at or
    /// before it, or empty.
    pub fn get_objects(&self, frame: impl Into<i64>) -> &[DetectedObject] {
        self.objects.at(frame.into())
    }

    /// Every action segment covering `frame`, in timeline order.
    pub fn get_actions_at(&self, frame: FrameIndex) -> Vec<&ActionSegment> {
        self.actions.iter().filter(|a| a.contains(frame)).collect()
    }

    /// The segment displayed at `frame` (the earliest-starting one).
    pub fn active_action(&self, frame: FrameIndex) -> Option<&ActionSegment> {
        self.actions.iter().find(|a| a.contains(frame))
    }

    /// Frames spanned by the data: one past the highest referenced frame.
    pub fn frame_span(&self) -> u32 {
        let pose = self.pose.last_frame();
        let objects = self.objects.last_frame();
        let actions = self.actions.iter().map(|a| a.end).max();
        [pose, objects, actions]
            .into_iter()
            .flatten()
            .max()
            .map_or(0, |last| last.saturating_add(1))
    }

    // ========================================================================
    // Pose edits
    // ========================================================================

    /// Move (or create) one keypoint. Creates the pose frame if absent.
    ///
    /// An existing keypoint keeps its depth and confidence; a new one gets
    /// [`MANUAL_CONFIDENCE`].
    pub fn set_pose_keypoint(
        &mut self,
        frame: FrameIndex,
        name: &str,
        position: SourcePoint,
    ) -> Result<(), DocumentError> {
        if name.trim().is_empty() {
            return Err(DocumentError::EmptyKeypointName);
        }
        let pose = self.pose.entry(frame, MANUAL_CONFIDENCE);
        match pose.keypoints.get_mut(name) {
            Some(kp) => kp.position = position,
            None => {
                pose.keypoints
                    .insert(name.to_string(), Keypoint::new(position, MANUAL_CONFIDENCE));
            }
        }
        log::debug!("Keypoint '{}' on frame {} set to {:?}", name, frame, position);
        Ok(())
    }

    /// Replace the whole pose of a frame.
    pub fn set_pose_frame(&mut self, frame: FrameIndex, pose: PoseFrame) {
        self.pose.insert(frame, pose);
    }

    // ========================================================================
    // Object edits
    // ========================================================================

    /// Replace the object list of a frame.
    pub fn set_objects(&mut self, frame: FrameIndex, objects: Vec<DetectedObject>) {
        log::debug!("Frame {}: {} objects", frame, objects.len());
        self.objects.set(frame, objects);
    }

    /// Add an object to what is shown at `frame`, returning its index.
    ///
    /// If `frame` only shows fallback data, the fallback list is copied onto
    /// `frame` first so the edit does not leak into the earlier frame.
    pub fn add_object(&mut self, frame: FrameIndex, object: DetectedObject) -> usize {
        let list = self.materialize_objects(frame);
        list.push(object);
        list.len() - 1
    }

    /// Replace the object at `index` of what is shown at `frame`.
    pub fn replace_object(
        &mut self,
        frame: FrameIndex,
        index: usize,
        object: DetectedObject,
    ) -> Result<DetectedObject, DocumentError> {
        let len = self.get_objects(frame).len();
        if index >= len {
            return Err(DocumentError::out_of_range(index, len));
        }
        let list = self.materialize_objects(frame);
        Ok(std::mem::replace(&mut list[index], object))
    }

    /// Remove the object at `index` of what is shown at `frame`.
    pub fn remove_object(
        &mut self,
        frame: FrameIndex,
        index: usize,
    ) -> Result<DetectedObject, DocumentError> {
        let len = self.get_objects(frame).len();
        if index >= len {
            return Err(DocumentError::out_of_range(index, len));
        }
        let list = self.materialize_objects(frame);
        Ok(list.remove(index))
    }

    fn materialize_objects(&mut self, frame: FrameIndex) -> &mut Vec<DetectedObject> {
        self.objects.materialize(frame)
    }

    // ========================================================================
    // Action edits
    // ========================================================================

    /// Insert a segment keeping the list sorted by start frame.
    ///
    /// Equal start frames keep insertion order. Returns the new index.
    pub fn add_action(&mut self, segment: ActionSegment) -> Result<usize, DocumentError> {
        segment.validate()?;
        let index = self.actions.partition_point(|a| a.start <= segment.start);
        log::debug!(
            "Action '{}' [{}..={}] inserted at {}",
            segment.label,
            segment.start,
            segment.end,
            index
        );
        self.actions.insert(index, segment);
        Ok(index)
    }

    /// Remove a segment by position.
    pub fn delete_action(&mut self, index: usize) -> Result<ActionSegment, DocumentError> {
        if index >= self.actions.len() {
            return Err(DocumentError::out_of_range(index, self.actions.len()));
        }
        Ok(self.actions.remove(index))
    }

    // ========================================================================
    // Summary
    // ========================================================================

    /// Counts of what the document holds.
    pub fn summary(&self) -> DocumentSummary {
        let labels: BTreeSet<&str> = self.actions.iter().map(|a| a.label.as_str()).collect();
        DocumentSummary {
            pose_frames: self.pose.len(),
            keypoints_per_frame: self.pose.iter().next().map_or(0, |(_, p)| p.len()),
            object_frames: self.objects.len(),
            total_detections: self.objects.total_detections(),
            action_count: self.actions.len(),
            action_labels: labels.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Counts of what a document holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub pose_frames: usize,
    pub keypoints_per_frame: usize,
    pub object_frames: usize,
    pub total_detections: usize,
    pub action_count: usize,
    /// Distinct action labels, sorted.
    pub action_labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::BoundingBox;

    fn segment(label: &str, start: u32, end: u32) -> ActionSegment {
        ActionSegment::new(label, start, end, 0.9).unwrap()
    }

    fn spans(doc: &AnnotationDocument) -> Vec<(u32, u32)> {
        doc.actions().iter().map(|a| (a.start, a.end)).collect()
    }

    fn boxed(label: &str) -> DetectedObject {
        DetectedObject::new(label, BoundingBox::new(100.0, 100.0, 100.0, 100.0), 0.9)
    }

    #[test]
    fn test_add_action_keeps_sort_order() {
        let mut doc = AnnotationDocument::new();
        doc.add_action(segment("standing", 0, 25)).unwrap();
        doc.add_action(segment("lifting", 65, 90)).unwrap();
        let index = doc.add_action(segment("reaching", 50, 60)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(spans(&doc), vec![(0, 25), (50, 60), (65, 90)]);
    }

    #[test]
    fn test_add_action_sorted_after_any_sequence() {
        let mut doc = AnnotationDocument::new();
        for (i, start) in [40, 3, 77, 3, 0, 91, 12, 40].into_iter().enumerate() {
            doc.add_action(segment(&format!("a{}", i), start, start + 5))
                .unwrap();
            let starts: Vec<u32> = doc.actions().iter().map(|a| a.start).collect();
            let mut sorted = starts.clone();
            sorted.sort();
            assert_eq!(starts, sorted);
        }
        // Equal starts keep insertion order.
        let threes: Vec<&str> = doc
            .actions()
            .iter()
            .filter(|a| a.start == 3)
            .map(|a| a.label.as_str())
            .collect();
        assert_eq!(threes, vec!["a1", "a3"]);
    }

    #[test]
    fn test_add_action_rejects_inverted_range() {
        let mut doc = AnnotationDocument::new();
        doc.add_action(segment("standing", 0, 25)).unwrap();
        let before = doc.clone();
        let bad = ActionSegment {
            label: "broken".to_string(),
            start: 60,
            end: 50,
            confidence: 0.9,
        };
        assert_eq!(
            doc.add_action(bad),
            Err(DocumentError::InvalidRange { start: 60, end: 50 })
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_delete_action_out_of_range() {
        let mut doc = AnnotationDocument::new();
        doc.add_action(segment("standing", 0, 25)).unwrap();
        let before = doc.clone();
        assert_eq!(
            doc.delete_action(1),
            Err(DocumentError::OutOfRange { index: 1, len: 1 })
        );
        assert_eq!(doc, before);
        assert_eq!(doc.delete_action(0).unwrap().label, "standing");
        assert!(doc.actions().is_empty());
    }

    #[test]
    fn test_get_actions_at_allows_overlap() {
        let mut doc = AnnotationDocument::new();
        doc.add_action(segment("walk", 0, 50)).unwrap();
        doc.add_action(segment("wave", 20, 30)).unwrap();
        let labels: Vec<&str> = doc
            .get_actions_at(25)
            .iter()
            .map(|a| a.label.as_str())
            .collect();
        assert_eq!(labels, vec!["walk", "wave"]);
        assert_eq!(doc.active_action(25).map(|a| a.label.as_str()), Some("walk"));
        assert!(doc.get_actions_at(51).is_empty());
    }

    #[test]
    fn test_set_pose_keypoint_upserts() {
        let mut doc = AnnotationDocument::new();
        assert!(doc.get_pose(4).is_none());
        doc.set_pose_keypoint(4, "nose", SourcePoint::Pixels { x: 10.0, y: 20.0 })
            .unwrap();
        let pose = doc.get_pose(4).unwrap();
        assert_eq!(pose.confidence, MANUAL_CONFIDENCE);
        assert_eq!(pose.get("nose").unwrap().confidence, MANUAL_CONFIDENCE);

        let mut frame = PoseFrame::new(0.8);
        frame.keypoints.insert(
            "nose".to_string(),
            Keypoint::new(SourcePoint::Normalized { x: 0.1, y: 0.1 }, 0.6).with_z(0.3),
        );
        doc.set_pose_frame(5, frame);
        doc.set_pose_keypoint(5, "nose", SourcePoint::Normalized { x: 0.2, y: 0.4 })
            .unwrap();
        let kp = doc.get_pose(5).unwrap().get("nose").unwrap();
        assert_eq!(kp.position, SourcePoint::Normalized { x: 0.2, y: 0.4 });
        assert_eq!(kp.confidence, 0.6);
        assert_eq!(kp.z, 0.3);
    }

    #[test]
    fn test_empty_keypoint_name_rejected() {
        let mut doc = AnnotationDocument::new();
        assert_eq!(
            doc.set_pose_keypoint(0, " ", SourcePoint::Pixels { x: 0.0, y: 0.0 }),
            Err(DocumentError::EmptyKeypointName)
        );
        assert!(doc.get_pose(0).is_none());
    }

    #[test]
    fn test_get_objects_sparse_fallback() {
        let mut doc = AnnotationDocument::new();
        doc.set_objects(0, vec![boxed("zero")]);
        doc.set_objects(5, vec![boxed("five")]);
        doc.set_objects(10, vec![boxed("ten")]);
        assert_eq!(doc.get_objects(7u32)[0].label, "five");
        assert!(doc.get_objects(-1i64).is_empty());
    }

    #[test]
    fn test_get_objects_before_first_frame_is_empty() {
        let mut doc = AnnotationDocument::new();
        doc.set_objects(5, vec![boxed("five")]);
        assert!(doc.get_objects(4u32).is_empty());
    }

    #[test]
    fn test_add_object_on_fallback_frame_copies_list() {
        let mut doc = AnnotationDocument::new();
        doc.set_objects(0, vec![boxed("cup")]);
        let index = doc.add_object(3, boxed("box"));
        assert_eq!(index, 1);
        assert_eq!(doc.get_objects(3u32).len(), 2);
        assert_eq!(doc.get_objects(0u32).len(), 1);
        assert_eq!(doc.get_objects(2u32).len(), 1);
    }

    #[test]
    fn test_remove_object() {
        let mut doc = AnnotationDocument::new();
        doc.set_objects(0, vec![boxed("cup"), boxed("box")]);
        assert_eq!(
            doc.remove_object(2, 2),
            Err(DocumentError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(doc.objects().len(), 1);
        let removed = doc.remove_object(2, 0).unwrap();
        assert_eq!(removed.label, "cup");
        assert_eq!(doc.get_objects(2u32)[0].label, "box");
        assert_eq!(doc.get_objects(0u32).len(), 2);
    }

    #[test]
    fn test_replace_object() {
        let mut doc = AnnotationDocument::new();
        doc.set_objects(0, vec![boxed("cup")]);
        let moved = DetectedObject::new("cup", BoundingBox::new(5.0, 5.0, 10.0, 10.0), 0.9);
        doc.replace_object(0, 0, moved.clone()).unwrap();
        assert_eq!(doc.get_objects(0u32), &[moved]);
    }

    #[test]
    fn test_frame_span_and_summary() {
        let mut doc = AnnotationDocument::new();
        assert_eq!(doc.frame_span(), 0);
        doc.set_pose_keypoint(1, "nose", SourcePoint::Pixels { x: 0.0, y: 0.0 })
            .unwrap();
        doc.set_objects(3, vec![boxed("cup"), boxed("box")]);
        doc.add_action(segment("walk", 0, 40)).unwrap();
        doc.add_action(segment("walk", 41, 45)).unwrap();
        assert_eq!(doc.frame_span(), 46);

        let summary = doc.summary();
        assert_eq!(summary.pose_frames, 1);
        assert_eq!(summary.keypoints_per_frame, 1);
        assert_eq!(summary.object_frames, 1);
        assert_eq!(summary.total_detections, 2);
        assert_eq!(summary.action_count, 2);
        assert_eq!(summary.action_labels, vec!["walk".to_string()]);
    }
}
