//! Time to frame mapping.
//!
//! Playback callbacks arrive at display refresh granularity rather than once
//! per frame, so the current frame is always recomputed from the media time
//! instead of being counted.

use crate::constants::DEFAULT_FPS;

/// Zero-based frame index.
pub type FrameIndex = u32;

/// Converts between continuous playback time and discrete frames for one clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
    total_frames: u32,
}

impl FrameClock {
    /// Create a clock for a clip with a known frame count.
    ///
    /// A non-finite or non-positive `fps` falls back to [`DEFAULT_FPS`].
    pub fn new(fps: f64, total_frames: u32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            log::warn!("Invalid frame rate {}, using {}", fps, DEFAULT_FPS);
            DEFAULT_FPS
        };
        Self { fps, total_frames }
    }

    /// Create a clock from a clip duration in seconds.
    pub fn from_duration(fps: f64, duration_secs: f64) -> Self {
        let clock = Self::new(fps, 0);
        let total = if duration_secs.is_finite() && duration_secs > 0.0 {
            (duration_secs * clock.fps).floor() as u32
        } else {
            0
        };
        Self {
            total_frames: total,
            ..clock
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Index of the last valid frame, or `None` for an empty clip.
    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.total_frames.checked_sub(1)
    }

    /// Frame shown at `time_secs`.
    ///
    /// Negative or NaN times map to frame 0. Times at or beyond the clip end
    /// map to the last frame when the frame count is known.
    pub fn frame_of(&self, time_secs: f64) -> FrameIndex {
        let frame = frame_of(time_secs, self.fps);
        self.clamp(frame)
    }

    /// Start time of `frame` in seconds.
    pub fn time_of(&self, frame: FrameIndex) -> f64 {
        time_of(frame, self.fps)
    }

    /// Clamp a frame into `[0, total_frames - 1]`.
    ///
    /// An unknown frame count (0) leaves the frame untouched.
    pub fn clamp(&self, frame: FrameIndex) -> FrameIndex {
        match self.last_frame() {
            Some(last) => frame.min(last),
            None => frame,
        }
    }

    /// Clamp a signed frame (e.g. `current - 1`) into the valid range.
    pub fn clamp_signed(&self, frame: i64) -> FrameIndex {
        let frame = frame.max(0).min(u32::MAX as i64) as u32;
        self.clamp(frame)
    }

    /// Frame `delta` steps away from `frame`, clamped to the clip.
    pub fn step(&self, frame: FrameIndex, delta: i64) -> FrameIndex {
        self.clamp_signed(frame as i64 + delta)
    }

    /// Clip duration in seconds.
    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.fps
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FPS, 0)
    }
}

/// `floor(time × fps)`, saturating at zero.
pub fn frame_of(time_secs: f64, fps: f64) -> FrameIndex {
    if time_secs.is_nan() || time_secs <= 0.0 || fps.is_nan() || fps <= 0.0 {
        return 0;
    }
    let raw = (time_secs * fps).floor();
    if raw >= u32::MAX as f64 {
        u32::MAX
    } else {
        raw as u32
    }
}

/// Start time of `frame` in seconds.
pub fn time_of(frame: FrameIndex, fps: f64) -> f64 {
    if fps.is_nan() || fps <= 0.0 {
        return 0.0;
    }
    // Nudge into the frame so float error never lands just before the boundary.
    (frame as f64 + 1e-6) / fps
}
