//! Matcher configuration.

use serde::{Deserialize, Serialize};

/// Default confidence required to accept a feature anchor.
pub const DEFAULT_FEATURE_CONFIDENCE: f64 = 0.7;

/// Default confidence required to accept a motion-only update.
pub const DEFAULT_MOTION_CONFIDENCE: f64 = 0.5;

/// Default number of frames after which the anchor is refreshed.
pub const DEFAULT_MAX_FRAMES_SINCE_ANCHOR: u32 = 30;

/// Default consecutive failures before the tracker is declared lost.
pub const DEFAULT_LOST_AFTER: u32 = 3;

/// One level of the scale cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleLevel {
    /// Resample factor applied to the frame before detection.
    pub scale: f64,
    /// Strongest frame features kept at this level.
    pub max_features: usize,
    /// Good matches required before RANSAC is attempted.
    pub min_matches: usize,
    /// Confidence at which this level ends the cascade. `None` falls back
    /// to [`MatcherConfig::early_exit_confidence`].
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Label used in logs.
    pub name: String,
}

impl ScaleLevel {
    pub fn new(name: impl Into<String>, scale: f64, max_features: usize, min_matches: usize) -> Self {
        Self {
            scale,
            max_features,
            min_matches,
            min_confidence: None,
            name: name.into(),
        }
    }

    /// Require `confidence` before this level may end the cascade.
    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = Some(confidence);
        self
    }
}

/// Default cascade: a cheap half-resolution pass that only wins when it is
/// decisive, then full resolution.
pub fn default_levels() -> Vec<ScaleLevel> {
    vec![
        ScaleLevel::new("coarse", 0.5, 300, 8).with_min_confidence(0.9),
        ScaleLevel::new("full", 1.0, 500, 10),
    ]
}

/// Configuration for [`CascadeScaleMatcher`](super::CascadeScaleMatcher).
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Minimum anchor confidence (default: 0.7).
    pub feature_confidence: f64,

    /// Minimum RANSAC inliers for an anchor (default: 8).
    pub min_inliers: usize,

    /// Minimum motion confidence for a tracked update (default: 0.5).
    pub motion_confidence: f64,

    /// Frames since the last anchor after which a full match is forced
    /// (default: 30).
    pub max_frames_since_anchor: u32,

    /// Consecutive failed attempts before entering LOST (default: 3).
    pub lost_after: u32,

    /// A level reaching this confidence ends the cascade, unless the level
    /// sets its own `min_confidence` (default: 0.8).
    pub early_exit_confidence: f64,

    /// Re-anchoring searches the last viewport grown by this factor around
    /// its centre (default: 1.5).
    pub roi_expansion: f64,

    /// Cascade levels tried in order (default: 0.5 then 1.0).
    pub levels: Vec<ScaleLevel>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            feature_confidence: DEFAULT_FEATURE_CONFIDENCE,
            min_inliers: 8,
            motion_confidence: DEFAULT_MOTION_CONFIDENCE,
            max_frames_since_anchor: DEFAULT_MAX_FRAMES_SINCE_ANCHOR,
            lost_after: DEFAULT_LOST_AFTER,
            early_exit_confidence: 0.8,
            roi_expansion: 1.5,
            levels: default_levels(),
        }
    }
}

impl MatcherConfig {
    /// Confidence at which `level` ends the cascade.
    pub fn exit_confidence(&self, level: &ScaleLevel) -> f64 {
        level.min_confidence.unwrap_or(self.early_exit_confidence)
    }

    /// Candidate scales in cascade order.
    pub fn scales(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatcherConfig::default();
        assert_eq!(config.feature_confidence, 0.7);
        assert_eq!(config.min_inliers, 8);
        assert_eq!(config.motion_confidence, 0.5);
        assert_eq!(config.max_frames_since_anchor, 30);
        assert_eq!(config.lost_after, 3);
        assert_eq!(config.scales(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_exit_confidence_per_level() {
        let config = MatcherConfig::default();
        assert_eq!(config.exit_confidence(&config.levels[0]), 0.9);
        assert_eq!(config.exit_confidence(&config.levels[1]), 0.8);

        let custom = ScaleLevel::new("x", 0.25, 100, 6).with_min_confidence(0.95);
        assert_eq!(config.exit_confidence(&custom), 0.95);
    }
}
