//! Error types for annotation document edits.

use thiserror::Error;

use crate::timing::FrameIndex;

/// Errors raised by document mutations.
///
/// Every variant is raised before the document is touched, so a failed edit
/// leaves the document unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Action segment whose start lies after its end
    #[error("Invalid frame range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested first frame
        start: FrameIndex,
        /// Requested last frame
        end: FrameIndex,
    },

    /// Positional index past the end of a list
    #[error("Index {index} out of range (length {len})")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Length of the list at the time of the request
        len: usize,
    },

    /// Keypoint name that is empty
    #[error("Keypoint name must not be empty")]
    EmptyKeypointName,
}

impl DocumentError {
    /// Create an out of range error.
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }
}
