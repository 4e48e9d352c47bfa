//! Coordinate scaling between annotation space and the on-screen canvas.
//!
//! Annotations are stored either normalized to `0..=1` or in pixels of a fixed
//! reference resolution. Every stored point carries that tag, so no consumer
//! has to guess. The canvas is mapped with independent X and Y scale factors:
//! the overlay always covers the whole video element, whatever its aspect.

use serde::{Deserialize, Serialize};

use crate::constants::{REFERENCE_HEIGHT, REFERENCE_WIDTH};

/// A 2D point in some pixel space (screen or reference).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point.
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Offset this point by a delta.
    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Which coordinate system a stored value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSpace {
    /// Fractions of the frame size, `0..=1` on both axes.
    Normalized,
    /// Pixels at the reference resolution.
    #[default]
    Pixels,
}

impl SourceSpace {
    /// Guess the space of an untagged payload.
    ///
    /// Only used at the wire boundary for payloads that do not declare their
    /// space: the payload is normalized if every coordinate lies in `0..=1`.
    /// An empty payload is treated as pixels.
    pub fn detect<I>(coords: I) -> Self
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        let mut seen = false;
        for (x, y) in coords {
            seen = true;
            if x > 1.0 || y > 1.0 {
                return SourceSpace::Pixels;
            }
        }
        if seen {
            SourceSpace::Normalized
        } else {
            SourceSpace::Pixels
        }
    }
}

/// A position tagged with the space it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "space", rename_all = "lowercase")]
pub enum SourcePoint {
    Normalized { x: f32, y: f32 },
    Pixels { x: f32, y: f32 },
}

impl SourcePoint {
    /// Build a point in `space` from raw coordinates.
    pub fn in_space(space: SourceSpace, x: f32, y: f32) -> Self {
        match space {
            SourceSpace::Normalized => SourcePoint::Normalized { x, y },
            SourceSpace::Pixels => SourcePoint::Pixels { x, y },
        }
    }

    pub fn space(&self) -> SourceSpace {
        match self {
            SourcePoint::Normalized { .. } => SourceSpace::Normalized,
            SourcePoint::Pixels { .. } => SourceSpace::Pixels,
        }
    }

    /// Raw coordinates, without the tag.
    pub fn xy(&self) -> (f32, f32) {
        match *self {
            SourcePoint::Normalized { x, y } | SourcePoint::Pixels { x, y } => (x, y),
        }
    }

    /// Position in reference pixels.
    pub fn to_reference(&self, reference: Size) -> Point {
        match *self {
            SourcePoint::Normalized { x, y } => Point::new(x * reference.width, y * reference.height),
            SourcePoint::Pixels { x, y } => Point::new(x, y),
        }
    }

    /// Re-express a reference-pixel position in `space`.
    pub fn from_reference(point: Point, space: SourceSpace, reference: Size) -> Self {
        match space {
            SourceSpace::Normalized => SourcePoint::Normalized {
                x: point.x / reference.width,
                y: point.y / reference.height,
            },
            SourceSpace::Pixels => SourcePoint::Pixels {
                x: point.x,
                y: point.y,
            },
        }
    }
}

/// Width and height of a pixel surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// The reference resolution detector output is scaled against.
    pub fn reference() -> Self {
        Self::new(REFERENCE_WIDTH, REFERENCE_HEIGHT)
    }

    /// Both dimensions are finite and positive.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::reference()
    }
}

/// Maps between annotation space and a canvas of a given size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    reference: Size,
    canvas: Size,
}

impl Scaler {
    /// Create a scaler. Degenerate sizes are replaced by the reference size so
    /// the mapping stays invertible.
    pub fn new(reference: Size, canvas: Size) -> Self {
        let reference = if reference.is_valid() {
            reference
        } else {
            Size::reference()
        };
        let canvas = if canvas.is_valid() {
            canvas
        } else {
            log::debug!("Degenerate canvas {:?}, mapping 1:1", canvas);
            reference
        };
        Self { reference, canvas }
    }

    /// Scaler for the default reference resolution.
    pub fn for_canvas(canvas: Size) -> Self {
        Self::new(Size::reference(), canvas)
    }

    pub fn reference(&self) -> Size {
        self.reference
    }

    pub fn canvas(&self) -> Size {
        self.canvas
    }

    /// Horizontal reference-to-canvas factor.
    pub fn scale_x(&self) -> f32 {
        self.canvas.width / self.reference.width
    }

    /// Vertical reference-to-canvas factor.
    pub fn scale_y(&self) -> f32 {
        self.canvas.height / self.reference.height
    }

    /// Map an annotation point onto the canvas.
    pub fn to_screen(&self, point: SourcePoint) -> Point {
        match point {
            SourcePoint::Normalized { x, y } => {
                Point::new(x * self.canvas.width, y * self.canvas.height)
            }
            SourcePoint::Pixels { x, y } => Point::new(x * self.scale_x(), y * self.scale_y()),
        }
    }

    /// Map a canvas point back into `space`.
    pub fn to_source(&self, screen: Point, space: SourceSpace) -> SourcePoint {
        match space {
            SourceSpace::Normalized => SourcePoint::Normalized {
                x: screen.x / self.canvas.width,
                y: screen.y / self.canvas.height,
            },
            SourceSpace::Pixels => SourcePoint::Pixels {
                x: screen.x / self.scale_x(),
                y: screen.y / self.scale_y(),
            },
        }
    }

    /// Map a canvas point to reference pixels.
    pub fn screen_to_reference(&self, screen: Point) -> Point {
        Point::new(screen.x / self.scale_x(), screen.y / self.scale_y())
    }
}
