//! Detected objects and the sparse per-frame object track.
//!
//! Detectors only run on some frames. A frame with no entry shows the
//! detections of the nearest earlier populated frame.

use std::cell::Cell;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coords::{Point, Size, SourcePoint, SourceSpace};
use crate::timing::FrameIndex;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Top-left corner X coordinate
    pub x: f32,
    /// Top-left corner Y coordinate
    pub y: f32,
    /// Width of the box
    pub width: f32,
    /// Height of the box
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a bounding box from two corners given in any order.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Corners as `[x1, y1, x2, y2]`.
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Check if a point is inside the box.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Get the area of the box.
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Move the box by a delta.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// One detection on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub bbox: BoundingBox,
    /// Space `bbox` is expressed in.
    #[serde(default)]
    pub space: SourceSpace,
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            space: SourceSpace::Pixels,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Set the coordinate space of the box.
    pub fn in_space(mut self, space: SourceSpace) -> Self {
        self.space = space;
        self
    }

    /// Top-left and bottom-right corners as tagged points.
    pub fn corner_points(&self) -> (SourcePoint, SourcePoint) {
        let [x1, y1, x2, y2] = self.bbox.corners();
        (
            SourcePoint::in_space(self.space, x1, y1),
            SourcePoint::in_space(self.space, x2, y2),
        )
    }

    /// Bounding box in reference pixels.
    pub fn reference_bbox(&self, reference: Size) -> BoundingBox {
        let (a, b) = self.corner_points();
        let a = a.to_reference(reference);
        let b = b.to_reference(reference);
        BoundingBox::from_corners(a.x, a.y, b.x, b.y)
    }
}

/// Cached result of the last backward lookup.
///
/// Valid for every query `q` with `lower <= q < upper`, where `lower` is the
/// query that produced it and `upper` the next populated frame after the
/// resolved one (or unbounded).
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResolveCache {
    lower: i64,
    upper: Option<FrameIndex>,
    resolved: Option<FrameIndex>,
}

impl ResolveCache {
    fn covers(&self, query: i64) -> bool {
        query >= self.lower && self.upper.is_none_or(|upper| query < upper as i64)
    }
}

/// Per-frame object lists of one video.
#[derive(Debug, Clone, Default)]
pub struct ObjectTrack {
    frames: BTreeMap<FrameIndex, Vec<DetectedObject>>,
    cache: Cell<Option<ResolveCache>>,
}

impl PartialEq for ObjectTrack {
    fn eq(&self, other: &Self) -> bool {
        self.frames == other.frames
    }
}

impl ObjectTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects stored exactly at `frame`, without fallback.
    pub fn exact(&self, frame: FrameIndex) -> Option<&[DetectedObject]> {
        self.frames.get(&frame).map(Vec::as_slice)
    }

    /// Nearest populated frame at or before `frame`.
    ///
    /// Negative queries resolve to nothing. Consecutive queries that land in
    /// the same gap are answered from a cache without touching the map.
    pub fn resolve(&self, frame: i64) -> Option<FrameIndex> {
        if frame < 0 {
            return None;
        }
        if let Some(cache) = self.cache.get() {
            if cache.covers(frame) {
                return cache.resolved;
            }
        }

        let query = frame.min(FrameIndex::MAX as i64) as FrameIndex;
        let resolved = self.frames.range(..=query).next_back().map(|(f, _)| *f);
        let upper = self
            .frames
            .range(query.saturating_add(1)..)
            .next()
            .map(|(f, _)| *f);
        // When query is FrameIndex::MAX the range above restarts at MAX itself.
        let upper = upper.filter(|u| *u as i64 > frame);

        self.cache.set(Some(ResolveCache {
            lower: resolved.map_or(0, |r| r as i64),
            upper,
            resolved,
        }));
        resolved
    }

    /// Objects shown at `frame`, falling back to the nearest earlier frame.
    pub fn at(&self, frame: i64) -> &[DetectedObject] {
        self.resolve(frame)
            .and_then(|f| self.frames.get(&f))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the object list of a frame.
    pub fn set(&mut self, frame: FrameIndex, objects: Vec<DetectedObject>) -> Option<Vec<DetectedObject>> {
        self.cache.set(None);
        self.frames.insert(frame, objects)
    }

    /// Mutable object list of exactly `frame`, if present.
    pub fn exact_mut(&mut self, frame: FrameIndex) -> Option<&mut Vec<DetectedObject>> {
        self.cache.set(None);
        self.frames.get_mut(&frame)
    }

    /// Object list of exactly `frame`, created from the fallback list shown
    /// there if the frame has no entry of its own.
    pub fn materialize(&mut self, frame: FrameIndex) -> &mut Vec<DetectedObject> {
        let inherited = if self.frames.contains_key(&frame) {
            Vec::new()
        } else {
            self.at(frame as i64).to_vec()
        };
        self.cache.set(None);
        self.frames.entry(frame).or_insert(inherited)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &[DetectedObject])> {
        self.frames.iter().map(|(f, objs)| (*f, objs.as_slice()))
    }

    /// Number of populated frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total detections over all frames.
    pub fn total_detections(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    /// Highest populated frame.
    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.frames.keys().next_back().copied()
    }
}

impl FromIterator<(FrameIndex, Vec<DetectedObject>)> for ObjectTrack {
    fn from_iter<T: IntoIterator<Item = (FrameIndex, Vec<DetectedObject>)>>(iter: T) -> Self {
        Self {
            frames: iter.into_iter().collect(),
            cache: Cell::new(None),
        }
    }
}
