//! Global constants for the annotation core.

/// Frame rate assumed for every clip unless the config says otherwise.
pub const DEFAULT_FPS: f64 = 30.0;

/// Reference resolution that normalized detector output is scaled against.
pub const REFERENCE_WIDTH: f32 = 1920.0;

/// Reference resolution height (see [`REFERENCE_WIDTH`]).
pub const REFERENCE_HEIGHT: f32 = 1080.0;

/// Pointer-to-keypoint hit radius, in source pixels.
pub const KEYPOINT_HIT_RADIUS: f32 = 10.0;

/// Confidence used when the backend omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Confidence bands for bounding box colouring.
pub mod confidence {
    /// Below this a detection is drawn as low confidence.
    pub const LOW: f32 = 0.5;
    /// Below this (and at or above [`LOW`]) a detection is medium confidence.
    pub const MEDIUM: f32 = 0.7;
}

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Video file extensions the backend accepts for upload.
pub const UPLOAD_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Status polling defaults.
pub mod polling {
    /// Delay before the first status request, in milliseconds.
    pub const INITIAL_INTERVAL_MS: u64 = 2000;
    /// Upper bound on the delay between two status requests.
    pub const MAX_INTERVAL_MS: u64 = 10_000;
    /// Growth factor applied to the delay after every non-terminal answer.
    pub const BACKOFF_FACTOR: f64 = 1.5;
    /// Requests sent before giving up.
    pub const MAX_ATTEMPTS: u32 = 60;
}
