//! Per-step match output.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{MatchMode, TrackerState};
use crate::coord::DetectionPoint;
use crate::features::Region;

/// The reference-map area covered by the current frame, in detection space.
///
/// Immutable: every accepted step produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Top-left corner.
    pub x: f64,
    pub y: f64,
    /// Extent in detection pixels.
    pub width: f64,
    pub height: f64,
    /// Detection pixels per frame pixel.
    pub scale: f64,
    /// Confidence of the result that produced this viewport.
    pub confidence: f64,
}

impl Viewport {
    /// Viewport of a `frame_width × frame_height` frame placed at `origin`.
    pub fn from_origin(
        origin: DetectionPoint,
        frame_width: u32,
        frame_height: u32,
        scale: f64,
        confidence: f64,
    ) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: frame_width as f64 * scale,
            height: frame_height as f64 * scale,
            scale,
            confidence,
        }
    }

    pub fn origin(&self) -> DetectionPoint {
        DetectionPoint::new(self.x, self.y)
    }

    pub fn center(&self) -> DetectionPoint {
        DetectionPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same size and scale at a new origin.
    pub fn moved_to(&self, origin: DetectionPoint, confidence: f64) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            confidence,
            ..*self
        }
    }

    /// Region around the centre grown by `factor` on each axis.
    pub fn expanded(&self, factor: f64) -> Region {
        let c = self.center();
        Region::centered(
            c.x as f32,
            c.y as f32,
            (self.width * factor) as f32,
            (self.height * factor) as f32,
        )
    }

    /// Convert a detection-space point into frame pixels.
    pub fn to_frame(&self, point: DetectionPoint) -> (f64, f64) {
        ((point.x - self.x) / self.scale, (point.y - self.y) / self.scale)
    }

    /// Whether a detection-space point lies inside the viewport.
    pub fn contains(&self, point: DetectionPoint) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

/// Outcome of one matcher step.
///
/// Failed steps carry no position and zero confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub frame_sequence: u64,
    /// Tracker state after the step.
    pub state: TrackerState,
    /// Estimator that was attempted.
    pub mode: MatchMode,
    /// Detection-space position of the frame's top-left corner.
    pub position: Option<DetectionPoint>,
    pub viewport: Option<Viewport>,
    pub confidence: f64,
    /// Cascade scale that produced (or last produced) the anchor.
    pub scale: f64,
    /// Good descriptor matches, for feature mode.
    pub matched_features: Option<usize>,
    /// RANSAC inliers, for feature mode.
    pub inliers: usize,
    pub timestamp: Instant,
    /// Time spent in the step.
    pub duration: Duration,
}

impl MatchResult {
    /// Whether the step produced a usable position.
    pub fn is_accepted(&self) -> bool {
        self.position.is_some()
    }
}
