//! Action timeline strip: segment blocks, playhead and click-to-seek.

use serde::Serialize;

use crate::coords::Point;
use crate::model::{ActionSegment, BoundingBox};
use crate::render::palette;
use crate::render::surface::{Color, DrawSurface};
use crate::timing::FrameIndex;

const BLOCK_INSET: f32 = 8.0;
const PLAYHEAD_WIDTH: f32 = 2.0;
const LABEL_FONT: f32 = 12.0;

/// One action segment laid out on the strip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBlock {
    /// Index of the segment in the document's action list
    pub index: usize,
    pub label: String,
    pub left: f32,
    pub width: f32,
    pub color: Color,
}

/// Horizontal layout of a timeline strip `width` pixels wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineLayout {
    total_frames: u32,
    width: f32,
    height: f32,
}

impl TimelineLayout {
    pub fn new(total_frames: u32, width: f32, height: f32) -> Self {
        Self {
            total_frames,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Frame under a click at `x`, clamped to the video.
    pub fn frame_at(&self, x: f32) -> FrameIndex {
        if self.total_frames == 0 || self.width <= 0.0 || x.is_nan() {
            return 0;
        }
        let fraction = (x / self.width).clamp(0.0, 1.0) as f64;
        let frame = (fraction * self.total_frames as f64).floor() as u32;
        frame.min(self.total_frames - 1)
    }

    /// X position of the left edge of `frame`.
    pub fn x_of(&self, frame: FrameIndex) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (frame as f64 / self.total_frames as f64 * self.width as f64) as f32
    }

    /// Playhead position for `frame`.
    pub fn playhead_x(&self, frame: FrameIndex) -> f32 {
        self.x_of(frame).min(self.width)
    }

    /// Blocks of `actions`, in list order.
    pub fn blocks(&self, actions: &[ActionSegment]) -> Vec<TimelineBlock> {
        actions
            .iter()
            .enumerate()
            .map(|(index, action)| {
                let left = self.x_of(action.start);
                let right = self.x_of(action.end.saturating_add(1));
                TimelineBlock {
                    index,
                    label: action.label.clone(),
                    left,
                    width: right - left,
                    color: palette::action_color(&action.label),
                }
            })
            .collect()
    }

    /// Segment under a click at `x`, the last one in the list winning.
    pub fn block_at(&self, actions: &[ActionSegment], x: f32) -> Option<usize> {
        self.blocks(actions)
            .iter()
            .rev()
            .find(|b| x >= b.left && x < b.left + b.width)
            .map(|b| b.index)
    }

    /// Tick marks at the quarters, labelled one-based for display.
    pub fn markers(&self) -> Vec<(f32, u32)> {
        if self.total_frames == 0 {
            return Vec::new();
        }
        let last = self.total_frames - 1;
        [0, last / 4, last / 2, 3 * last / 4, last]
            .into_iter()
            .map(|f| (self.x_of(f), f + 1))
            .collect()
    }

    /// Draw the strip at the surface origin.
    pub fn draw(&self, surface: &mut dyn DrawSurface, actions: &[ActionSegment], current: FrameIndex) {
        for block in self.blocks(actions) {
            let rect = BoundingBox::new(
                block.left,
                BLOCK_INSET,
                block.width,
                (self.height - 2.0 * BLOCK_INSET).max(0.0),
            );
            surface.fill_rect(rect, block.color);
            surface.text(
                &block.label,
                Point::new(rect.x + 4.0, rect.y + rect.height / 2.0 + LABEL_FONT / 3.0),
                Color::WHITE,
                LABEL_FONT,
            );
        }

        let x = self.playhead_x(current);
        surface.fill_rect(
            BoundingBox::new(x - PLAYHEAD_WIDTH / 2.0, 0.0, PLAYHEAD_WIDTH, self.height),
            palette::PLAYHEAD,
        );
        surface.text(
            &(current + 1).to_string(),
            Point::new(x, -4.0),
            palette::PLAYHEAD,
            LABEL_FONT,
        );
    }
}
