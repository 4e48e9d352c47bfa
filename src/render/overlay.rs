//! Frame overlay: skeleton, boxes and action banner drawn over the video,
//! plus pointer hit-testing for keypoint drags.

use crate::constants::KEYPOINT_HIT_RADIUS;
use crate::coords::{Point, Scaler, Size, SourcePoint};
use crate::model::{ActionSegment, AnnotationDocument, BoundingBox, DetectedObject, PoseFrame, Tool};
use crate::render::palette::{self, ConfidenceBands};
use crate::render::skeleton;
use crate::render::surface::{Color, DrawSurface};
use crate::timing::FrameIndex;

const BONE_WIDTH: f32 = 2.0;
const MARKER_RADIUS: f32 = 4.0;
const DRAGGED_MARKER_RADIUS: f32 = 8.0;
const MARKER_OUTLINE: f32 = 2.0;
const KEYPOINT_FONT: f32 = 10.0;
const DRAGGED_FONT: f32 = 12.0;

const BOX_WIDTH: f32 = 2.0;
const CHIP_HEIGHT: f32 = 20.0;
const CHIP_PADDING: f32 = 5.0;
const CHIP_FONT: f32 = 12.0;

/// Banner rectangle in screen pixels; stacked banners are offset by its
/// height plus a gap.
const BANNER: BoundingBox = BoundingBox {
    x: 10.0,
    y: 10.0,
    width: 150.0,
    height: 40.0,
};
const BANNER_GAP: f32 = 10.0;
const BANNER_FONT: f32 = 16.0;

// ============================================================================
// Frame slice
// ============================================================================

/// Everything the overlay shows for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSlice<'a> {
    pub pose: Option<&'a PoseFrame>,
    pub objects: &'a [DetectedObject],
    pub actions: Vec<&'a ActionSegment>,
    /// Keypoint currently being dragged
    pub dragging: Option<&'a str>,
}

impl<'a> FrameSlice<'a> {
    /// Slice of `document` at `frame`, with object fallback applied.
    pub fn of(document: &'a AnnotationDocument, frame: FrameIndex) -> Self {
        Self {
            pose: document.get_pose(frame),
            objects: document.get_objects(frame),
            actions: document.get_actions_at(frame),
            dragging: None,
        }
    }

    pub fn with_dragging(mut self, keypoint: Option<&'a str>) -> Self {
        self.dragging = keypoint;
        self
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Draws a [`FrameSlice`] for the active tool and maps pointer input back to
/// annotation space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRenderer {
    /// Keypoint grab radius in reference pixels.
    hit_radius: f32,
    bands: ConfidenceBands,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(KEYPOINT_HIT_RADIUS, ConfidenceBands::default())
    }
}

impl OverlayRenderer {
    pub fn new(hit_radius: f32, bands: ConfidenceBands) -> Self {
        Self { hit_radius, bands }
    }

    pub fn hit_radius(&self) -> f32 {
        self.hit_radius
    }

    /// Draw the layer of `tool` onto `surface`.
    pub fn render(&self, surface: &mut dyn DrawSurface, slice: &FrameSlice<'_>, tool: Tool, scaler: &Scaler) {
        match tool {
            Tool::Pose => {
                if let Some(pose) = slice.pose {
                    self.draw_pose(surface, pose, slice.dragging, scaler);
                }
            }
            Tool::Objects => self.draw_objects(surface, slice.objects, scaler),
            Tool::Actions => self.draw_actions(surface, &slice.actions),
        }
    }

    fn draw_pose(&self, surface: &mut dyn DrawSurface, pose: &PoseFrame, dragging: Option<&str>, scaler: &Scaler) {
        let screen = |name: &str| pose.get(name).map(|kp| scaler.to_screen(kp.position));

        for (a, b) in skeleton::present_connections(pose) {
            if let (Some(from), Some(to)) = (screen(a), screen(b)) {
                surface.line(from, to, palette::SKELETON, BONE_WIDTH);
            }
        }

        for (name, keypoint) in &pose.keypoints {
            let at = scaler.to_screen(keypoint.position);
            if dragging == Some(name.as_str()) {
                surface.fill_circle(at, DRAGGED_MARKER_RADIUS, palette::DRAGGED);
                surface.stroke_circle(at, DRAGGED_MARKER_RADIUS, Color::WHITE, MARKER_OUTLINE);
                surface.text(name, at.offset(10.0, -10.0), Color::WHITE, DRAGGED_FONT);
            } else {
                surface.fill_circle(at, MARKER_RADIUS, palette::SKELETON);
                surface.stroke_circle(at, MARKER_RADIUS, Color::WHITE, MARKER_OUTLINE);
                if skeleton::is_labelled(name) {
                    surface.text(name, at.offset(8.0, -8.0), Color::WHITE, KEYPOINT_FONT);
                }
            }
        }
    }

    fn draw_objects(&self, surface: &mut dyn DrawSurface, objects: &[DetectedObject], scaler: &Scaler) {
        for object in objects {
            let (a, b) = object.corner_points();
            let (a, b) = (scaler.to_screen(a), scaler.to_screen(b));
            let rect = BoundingBox::from_corners(a.x, a.y, b.x, b.y);

            surface.stroke_rect(rect, self.bands.color(object.confidence), BOX_WIDTH);

            let label = chip_text(object);
            let chip_width = surface.text_width(&label, CHIP_FONT) + 2.0 * CHIP_PADDING;
            surface.fill_rect(
                BoundingBox::new(rect.x, rect.y - CHIP_HEIGHT, chip_width, CHIP_HEIGHT),
                palette::LABEL_CHIP,
            );
            surface.text(
                &label,
                Point::new(rect.x + CHIP_PADDING, rect.y - CHIP_PADDING),
                Color::WHITE,
                CHIP_FONT,
            );
        }
    }

    fn draw_actions(&self, surface: &mut dyn DrawSurface, actions: &[&ActionSegment]) {
        for (i, action) in actions.iter().enumerate() {
            let banner = BANNER.translate(0.0, i as f32 * (BANNER.height + BANNER_GAP));
            surface.fill_rect(banner, palette::ACTION_BANNER);
            surface.text(
                &format!("Action: {}", action.label),
                Point::new(banner.x + 10.0, banner.y + 25.0),
                Color::BLACK,
                BANNER_FONT,
            );
        }
    }

    // ========================================================================
    // Hit testing
    // ========================================================================

    /// Keypoint nearest to `point` (reference pixels) within the hit radius.
    pub fn hit_test<'p>(&self, pose: &'p PoseFrame, point: Point, reference: Size) -> Option<&'p str> {
        pose.reference_positions(reference)
            .map(|(name, at)| (name, at.distance_to(&point)))
            .filter(|(_, d)| *d <= self.hit_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name)
    }

    /// Keypoint under a screen position.
    pub fn hit_test_screen<'p>(&self, pose: &'p PoseFrame, screen: Point, scaler: &Scaler) -> Option<&'p str> {
        self.hit_test(pose, scaler.screen_to_reference(screen), scaler.reference())
    }

    /// Topmost object containing `point` (reference pixels).
    pub fn hit_object(&self, objects: &[DetectedObject], point: Point, reference: Size) -> Option<usize> {
        objects
            .iter()
            .rposition(|o| o.reference_bbox(reference).contains(&point))
    }

    // ========================================================================
    // Dragging
    // ========================================================================

    /// Start dragging the keypoint under `screen`. No keypoint in range means
    /// no drag.
    pub fn begin_drag(&self, pose: &PoseFrame, screen: Point, scaler: &Scaler) -> Option<DragState> {
        let name = self.hit_test_screen(pose, screen, scaler)?;
        let keypoint = pose.get(name)?;
        log::debug!("Drag started on '{}'", name);
        Some(DragState {
            keypoint: name.to_string(),
            position: keypoint.position,
        })
    }

    /// Finish a drag, returning the keypoint and its final position.
    pub fn end_drag(&self, drag: DragState) -> (String, SourcePoint) {
        log::debug!("Drag ended on '{}' at {:?}", drag.keypoint, drag.position);
        (drag.keypoint, drag.position)
    }
}

/// `"{label} {confidence}%"`
fn chip_text(object: &DetectedObject) -> String {
    format!("{} {:.0}%", object.label, object.confidence * 100.0)
}

/// An in-progress keypoint drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    keypoint: String,
    position: SourcePoint,
}

impl DragState {
    pub fn keypoint(&self) -> &str {
        &self.keypoint
    }

    /// Current position, in the keypoint's own space.
    pub fn position(&self) -> SourcePoint {
        self.position
    }

    /// Move the keypoint under the pointer, returning its new position in
    /// the space it was stored in.
    pub fn drag_to(&mut self, screen: Point, scaler: &Scaler) -> SourcePoint {
        self.position = scaler.to_source(screen, self.position.space());
        self.position
    }
}
