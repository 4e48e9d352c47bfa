//! Drawing surface abstraction.
//!
//! The overlay never talks to a concrete canvas. It draws through
//! [`DrawSurface`], which a GUI backend implements over its own canvas and
//! which [`DisplayList`] implements by recording commands.

use serde::{Serialize, Serializer};

use crate::coords::{Point, Size};
use crate::model::BoundingBox;

/// Average glyph width as a ratio of font size.
const CHAR_WIDTH_RATIO: f32 = 0.6;

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb8(255, 255, 255);
    pub const BLACK: Color = Color::rgb8(0, 0, 0);
    pub const RED: Color = Color::rgb8(255, 0, 0);
    pub const YELLOW: Color = Color::rgb8(255, 255, 0);

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from 8-bit channels.
    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    /// Same color with a different alpha.
    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// `#rrggbb`, or `#rrggbbaa` when not opaque.
    pub fn to_hex(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let rgb = format!(
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        );
        if self.a >= 1.0 {
            rgb
        } else {
            format!("{}{:02x}", rgb, channel(self.a))
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Primitive drawing operations an overlay needs.
pub trait DrawSurface {
    /// Canvas size in screen pixels.
    fn size(&self) -> Size;

    fn line(&mut self, from: Point, to: Point, color: Color, width: f32);

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color);

    fn stroke_circle(&mut self, center: Point, radius: f32, color: Color, width: f32);

    fn fill_rect(&mut self, rect: BoundingBox, color: Color);

    /// Rectangle outline.
    fn stroke_rect(&mut self, rect: BoundingBox, color: Color, width: f32);

    /// Text with its baseline starting at `position`.
    fn text(&mut self, text: &str, position: Point, color: Color, size: f32);

    /// Estimated width of `text` at `size`.
    fn text_width(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * CHAR_WIDTH_RATIO
    }
}

// ============================================================================
// Display list
// ============================================================================

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Line {
        from: Point,
        to: Point,
        color: Color,
        width: f32,
    },
    FillCircle {
        center: Point,
        radius: f32,
        color: Color,
    },
    StrokeCircle {
        center: Point,
        radius: f32,
        color: Color,
        width: f32,
    },
    FillRect {
        rect: BoundingBox,
        color: Color,
    },
    StrokeRect {
        rect: BoundingBox,
        color: Color,
        width: f32,
    },
    Text {
        text: String,
        position: Point,
        color: Color,
        size: f32,
    },
}

/// Surface that records draw calls instead of rasterizing them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayList {
    size: Size,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// All text drawn so far, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Number of lines drawn so far.
    pub fn line_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count()
    }
}

impl DrawSurface for DisplayList {
    fn size(&self) -> Size {
        self.size
    }

    fn line(&mut self, from: Point, to: Point, color: Color, width: f32) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            width,
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            color,
        });
    }

    fn stroke_circle(&mut self, center: Point, radius: f32, color: Color, width: f32) {
        self.commands.push(DrawCommand::StrokeCircle {
            center,
            radius,
            color,
            width,
        });
    }

    fn fill_rect(&mut self, rect: BoundingBox, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: BoundingBox, color: Color, width: f32) {
        self.commands.push(DrawCommand::StrokeRect { rect, color, width });
    }

    fn text(&mut self, text: &str, position: Point, color: Color, size: f32) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            position,
            color,
            size,
        });
    }
}
