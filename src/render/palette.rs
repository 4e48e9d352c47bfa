//! Overlay colors.

use serde::{Deserialize, Serialize};

use crate::constants::confidence;
use crate::render::surface::Color;

pub const SKELETON: Color = Color::rgb8(0x3b, 0x82, 0xf6);
pub const DRAGGED: Color = Color::RED;
pub const CONFIDENT: Color = Color::rgb8(0x10, 0xb9, 0x81);
pub const LABEL_CHIP: Color = CONFIDENT.with_alpha(0.9);
pub const ACTION_BANNER: Color = Color::YELLOW.with_alpha(0.3);
pub const PLAYHEAD: Color = Color::RED;

/// Default color of an unknown action label.
pub const DEFAULT_ACTION: Color = Color::rgb8(0x93, 0x33, 0xea);

/// Thresholds splitting detections into low / medium / high confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceBands {
    /// Below this is low confidence
    pub low: f32,
    /// Below this (and at or above `low`) is medium confidence
    pub medium: f32,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            low: confidence::LOW,
            medium: confidence::MEDIUM,
        }
    }
}

impl ConfidenceBands {
    /// Outline color for a detection with the given confidence.
    pub fn color(&self, confidence: f32) -> Color {
        if confidence < self.low {
            Color::RED
        } else if confidence < self.medium {
            Color::YELLOW
        } else {
            CONFIDENT
        }
    }
}

/// Known action labels (base form) and their colors.
const ACTION_COLORS: [(&str, Color); 10] = [
    ("stand", Color::rgb8(0x6b, 0x72, 0x80)),
    ("walk", Color::rgb8(0x3b, 0x82, 0xf6)),
    ("reach", Color::rgb8(0x22, 0xc5, 0x5e)),
    ("pick", Color::rgb8(0xa8, 0x55, 0xf7)),
    ("wave", Color::rgb8(0xea, 0xb3, 0x08)),
    ("sit", Color::rgb8(0xef, 0x44, 0x44)),
    ("grasp", Color::rgb8(0x63, 0x66, 0xf1)),
    ("lift", Color::rgb8(0xec, 0x48, 0x99)),
    ("place", Color::rgb8(0x8b, 0x5c, 0xf6)),
    ("idle", Color::rgb8(0x6b, 0x72, 0x80)),
];

/// Color of an action label, matched case-insensitively on the base form
/// (`reaching` and `reach` share a color).
pub fn action_color(label: &str) -> Color {
    let label = label.trim().to_ascii_lowercase();
    ACTION_COLORS
        .iter()
        .find(|(base, _)| label == *base || gerund_of(&label, base))
        .map_or(DEFAULT_ACTION, |(_, color)| *color)
}

/// `waving` is a form of `wave`, `sitting` of `sit`.
fn gerund_of(label: &str, base: &str) -> bool {
    let Some(stem) = label.strip_suffix("ing") else {
        return false;
    };
    stem == base
        || base.strip_suffix('e') == Some(stem)
        || (stem.len() == base.len() + 1 && stem.starts_with(base) && stem.ends_with(&base[base.len() - 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_bands() {
        let bands = ConfidenceBands::default();
        assert_eq!(bands.color(0.3), Color::RED);
        assert_eq!(bands.color(0.5), Color::YELLOW);
        assert_eq!(bands.color(0.69), Color::YELLOW);
        assert_eq!(bands.color(0.7), CONFIDENT);
    }

    #[test]
    fn test_action_color_forms() {
        assert_eq!(action_color("reach"), action_color("Reaching"));
        assert_eq!(action_color("sitting"), action_color("sit"));
        assert_eq!(action_color("waving"), action_color("wave"));
        assert_eq!(action_color("placing"), action_color("place"));
        assert_eq!(action_color("lifting"), action_color("lift"));
        assert_ne!(action_color("reach"), action_color("walk"));
        assert_eq!(action_color("somersault"), DEFAULT_ACTION);
        assert_eq!(action_color("ing"), DEFAULT_ACTION);
    }
}
