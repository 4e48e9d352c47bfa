//! robolabel - video annotation core for robot-training datasets
//!
//! Frame-synchronized pose, object and action annotations for one video at a
//! time: timing and coordinate mapping, the in-memory annotation document,
//! a surface-agnostic overlay renderer, an edit session that persists edits
//! to the annotation backend, and the backend's REST client.

pub mod api;
pub mod config;
pub mod constants;
pub mod coords;
pub mod error;
pub mod model;
pub mod render;
pub mod session;
pub mod timing;
pub mod wire;

pub use error::{Error, ErrorKind, Result};
pub use session::EditSession;
