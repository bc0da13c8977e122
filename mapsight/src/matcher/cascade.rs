//! Two-mode position tracker.

use std::sync::Arc;
use std::time::Instant;

use image::GrayImage;

use super::search::{FeatureMatcher, LevelMatch, LevelMatcher};
use super::{MatchMode, MatchResult, MatcherConfig, TrackerState, Viewport};
use crate::coord::DetectionPoint;
use crate::features::FeatureConfig;
use crate::imaging::{self, PreprocessConfig};
use crate::motion::{MotionConfig, MotionFrame, MotionTracker};
use crate::reference::ReferenceMap;

/// Anchor held while ANCHORED or TRACKING.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    viewport: Viewport,
    /// Cascade level that produced the anchor.
    level_scale: f64,
    frames_since_anchor: u32,
}

/// Accepted full match.
#[derive(Debug, Clone, Copy)]
struct AnchorFix {
    viewport: Viewport,
    level_scale: f64,
    matches: usize,
    inliers: usize,
}

enum Outcome {
    Anchored(AnchorFix),
    Tracked(Viewport),
    Failed {
        mode: MatchMode,
        matched: Option<usize>,
        inliers: usize,
    },
    Degenerate,
}

/// Multi-scale feature matcher with motion-only tracking between anchors.
///
/// Owns the tracker state machine. Each [`step`](Self::step) consumes one
/// grayscale frame and returns a [`MatchResult`]:
///
/// - **COLD**: full cascade over the whole map.
/// - **ANCHORED / TRACKING**: phase correlation against the previous
///   accepted frame; a full match restricted to the last viewport when the
///   anchor is `max_frames_since_anchor` old or motion confidence drops.
/// - **LOST**: cleared at the start of the next step, which then runs as COLD.
///
/// Frames are preprocessed the way the reference map was before either
/// matching mode sees them.
///
/// Failed steps return zero confidence and no position. `lost_after`
/// consecutive failures, or one featureless frame while tracking, enter LOST.
///
/// # Example
///
/// ```ignore
/// let map = Arc::new(ReferenceMap::load(
///     "map.png",
///     0.5,
///     &FeatureConfig::default(),
///     PreprocessConfig::default(),
/// )?);
/// let mut matcher = CascadeScaleMatcher::with_reference(
///     MatcherConfig::default(),
///     map,
///     FeatureConfig::default(),
///     MotionConfig::default(),
/// );
/// let result = matcher.step(&frame.to_gray(), frame.sequence());
/// if let Some(viewport) = result.viewport {
///     overlay.move_to(viewport);
/// }
/// ```
pub struct CascadeScaleMatcher {
    config: MatcherConfig,
    search: Box<dyn LevelMatcher>,
    motion: MotionTracker,
    preprocess: PreprocessConfig,
    state: TrackerState,
    anchor: Option<Anchor>,
    /// Previous accepted frame, prepared for correlation.
    previous: Option<MotionFrame>,
    failures: u32,
}

impl std::fmt::Debug for CascadeScaleMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeScaleMatcher")
            .field("config", &self.config)
            .field("preprocess", &self.preprocess)
            .field("state", &self.state)
            .field("anchor", &self.anchor)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl CascadeScaleMatcher {
    /// Create a matcher with a custom level search.
    pub fn new<M>(config: MatcherConfig, search: M, motion: MotionTracker) -> Self
    where
        M: LevelMatcher + 'static,
    {
        Self {
            config,
            search: Box::new(search),
            motion,
            preprocess: PreprocessConfig::default(),
            state: TrackerState::Cold,
            anchor: None,
            previous: None,
            failures: 0,
        }
    }

    /// Create a feature-based matcher over a reference map.
    ///
    /// Frames get the map's preprocessing.
    pub fn with_reference(
        config: MatcherConfig,
        map: Arc<ReferenceMap>,
        features: FeatureConfig,
        motion: MotionConfig,
    ) -> Self {
        let preprocess = map.preprocess();
        Self::new(
            config,
            FeatureMatcher::new(map, features),
            MotionTracker::new(motion),
        )
        .with_preprocess(preprocess)
    }

    /// Preprocess frames before matching (default: none).
    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn preprocess(&self) -> PreprocessConfig {
        self.preprocess
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Viewport of the current anchor, if any.
    pub fn viewport(&self) -> Option<Viewport> {
        self.anchor.map(|a| a.viewport)
    }

    /// Steps since the last successful full match.
    pub fn frames_since_anchor(&self) -> Option<u32> {
        self.anchor.map(|a| a.frames_since_anchor)
    }

    /// Consecutive failed attempts.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Forget the anchor and return to COLD.
    pub fn reset(&mut self) {
        self.anchor = None;
        self.previous = None;
        self.failures = 0;
        self.transition(TrackerState::Cold, "reset");
    }

    /// Process one frame.
    pub fn step(&mut self, frame: &GrayImage, sequence: u64) -> MatchResult {
        let start = Instant::now();

        let preprocessed;
        let frame = if self.preprocess.is_identity() {
            frame
        } else {
            let mut copy = frame.clone();
            self.preprocess.apply(&mut copy);
            preprocessed = copy;
            &preprocessed
        };

        if self.state == TrackerState::Lost {
            self.transition(TrackerState::Cold, "retrying full search");
        }

        let anchor = self.anchor.filter(|_| self.state.has_anchor());
        let (outcome, prepared) = match anchor {
            Some(anchor) => self.step_anchored(frame, anchor),
            None => (self.full_match(frame, None), None),
        };

        let mut result = MatchResult {
            frame_sequence: sequence,
            state: self.state,
            mode: MatchMode::Anchored,
            position: None,
            viewport: None,
            confidence: 0.0,
            scale: self.anchor.map_or(0.0, |a| a.level_scale),
            matched_features: None,
            inliers: 0,
            timestamp: start,
            duration: Default::default(),
        };

        match outcome {
            Outcome::Anchored(fix) => {
                self.failures = 0;
                self.anchor = Some(Anchor {
                    viewport: fix.viewport,
                    level_scale: fix.level_scale,
                    frames_since_anchor: 0,
                });
                self.previous = Some(prepared.unwrap_or_else(|| self.motion.prepare(frame)));
                self.transition(TrackerState::Anchored, "feature match accepted");

                result.position = Some(fix.viewport.origin());
                result.viewport = Some(fix.viewport);
                result.confidence = fix.viewport.confidence;
                result.scale = fix.level_scale;
                result.matched_features = Some(fix.matches);
                result.inliers = fix.inliers;
            }
            Outcome::Tracked(viewport) => {
                self.failures = 0;
                if let Some(anchor) = self.anchor.as_mut() {
                    anchor.viewport = viewport;
                }
                self.previous = prepared;
                self.transition(TrackerState::Tracking, "motion update accepted");

                result.mode = MatchMode::Tracked;
                result.position = Some(viewport.origin());
                result.viewport = Some(viewport);
                result.confidence = viewport.confidence;
            }
            Outcome::Failed {
                mode,
                matched,
                inliers,
            } => {
                self.failures += 1;
                result.mode = mode;
                result.matched_features = matched;
                result.inliers = inliers;
                tracing::debug!(
                    sequence,
                    mode = %mode,
                    failures = self.failures,
                    state = %self.state,
                    "Match attempt failed"
                );
                if self.failures >= self.config.lost_after.max(1) {
                    self.enter_lost("too many consecutive failures");
                }
            }
            Outcome::Degenerate => {
                result.mode = MatchMode::Tracked;
                self.enter_lost("featureless frame");
            }
        }

        result.state = self.state;
        result.duration = start.elapsed();
        result
    }

    fn step_anchored(&mut self, frame: &GrayImage, anchor: Anchor) -> (Outcome, Option<MotionFrame>) {
        let frames_since_anchor = anchor.frames_since_anchor.saturating_add(1);
        if let Some(a) = self.anchor.as_mut() {
            a.frames_since_anchor = frames_since_anchor;
        }

        if frames_since_anchor >= self.config.max_frames_since_anchor {
            tracing::debug!(frames_since_anchor, "Periodic re-anchor");
            return (self.full_match(frame, Some(&anchor.viewport)), None);
        }

        let current = self.motion.prepare(frame);
        let Some(previous) = self.previous.as_ref() else {
            return (self.full_match(frame, Some(&anchor.viewport)), Some(current));
        };
        let estimate = self.motion.estimate(previous, &current);

        if estimate.degenerate {
            return (Outcome::Degenerate, None);
        }

        if estimate.confidence >= self.config.motion_confidence {
            let vp = anchor.viewport;
            let origin = vp
                .origin()
                .offset(estimate.dx * vp.scale, estimate.dy * vp.scale);
            tracing::trace!(
                dx = format!("{:.2}", estimate.dx),
                dy = format!("{:.2}", estimate.dy),
                confidence = format!("{:.2}", estimate.confidence),
                "Motion update"
            );
            return (Outcome::Tracked(vp.moved_to(origin, estimate.confidence)), Some(current));
        }

        tracing::debug!(
            confidence = format!("{:.2}", estimate.confidence),
            psr = format!("{:.1}", estimate.peak_to_sidelobe),
            "Motion confidence low, re-anchoring"
        );
        (self.full_match(frame, Some(&anchor.viewport)), Some(current))
    }

    /// Run the scale cascade and accept the best level if it clears the
    /// anchor thresholds.
    fn full_match(&self, frame: &GrayImage, hint: Option<&Viewport>) -> Outcome {
        let region = hint.map(|vp| vp.expanded(self.config.roi_expansion));

        let mut best: Option<(LevelMatch, f64, f64)> = None;
        for level in &self.config.levels {
            let resized;
            let image = if (level.scale - 1.0).abs() < f64::EPSILON {
                frame
            } else {
                resized = imaging::rescale(frame, level.scale);
                &resized
            };
            let factor = image.width() as f64 / frame.width().max(1) as f64;

            let Some(found) = self.search.match_level(image, level, region.as_ref()) else {
                continue;
            };
            if best.map_or(true, |(b, _, _)| found.confidence > b.confidence) {
                best = Some((found, factor, level.scale));
            }
            if found.confidence >= self.config.exit_confidence(level) {
                break;
            }
        }

        let Some((found, factor, level_scale)) = best else {
            return Outcome::Failed {
                mode: MatchMode::Anchored,
                matched: None,
                inliers: 0,
            };
        };

        if found.confidence < self.config.feature_confidence || found.inliers < self.config.min_inliers {
            tracing::debug!(
                confidence = format!("{:.2}", found.confidence),
                inliers = found.inliers,
                "Best level below anchor thresholds"
            );
            return Outcome::Failed {
                mode: MatchMode::Anchored,
                matched: Some(found.matches),
                inliers: found.inliers,
            };
        }

        let scale = found.model.scale * factor;
        let viewport = Viewport::from_origin(
            DetectionPoint::new(found.model.tx, found.model.ty),
            frame.width(),
            frame.height(),
            scale,
            found.confidence,
        );
        Outcome::Anchored(AnchorFix {
            viewport,
            level_scale,
            matches: found.matches,
            inliers: found.inliers,
        })
    }

    fn enter_lost(&mut self, reason: &'static str) {
        self.anchor = None;
        self.previous = None;
        self.failures = 0;
        self.transition(TrackerState::Lost, reason);
    }

    fn transition(&mut self, to: TrackerState, reason: &'static str) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        if to == TrackerState::Lost {
            tracing::warn!(from = %from, to = %to, reason, "Tracker state changed");
        } else {
            tracing::info!(from = %from, to = %to, reason, "Tracker state changed");
        }
    }
}
