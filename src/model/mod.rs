//! Annotation data model: pose and object tracks, action segments and the
//! per-video document that ties them together.

mod action;
mod document;
mod error;
mod objects;
mod placeholder;
mod pose;
mod tool;

pub use action::ActionSegment;
pub use document::{AnnotationDocument, DocumentSummary, MANUAL_CONFIDENCE};
pub use error::DocumentError;
pub use objects::{BoundingBox, DetectedObject, ObjectTrack};
pub use placeholder::{PLACEHOLDER_FRAMES, placeholder_document};
pub use pose::{Keypoint, PoseFrame, PoseTrack};
pub use tool::Tool;
