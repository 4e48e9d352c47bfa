//! Drawing of annotations over the video and the action timeline.

pub mod overlay;
pub mod palette;
pub mod skeleton;
pub mod surface;
pub mod timeline;

pub use overlay::{DragState, FrameSlice, OverlayRenderer};
pub use palette::ConfidenceBands;
pub use surface::{Color, DisplayList, DrawCommand, DrawSurface};
pub use timeline::{TimelineBlock, TimelineLayout};
