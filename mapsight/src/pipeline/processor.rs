//! Synchronous processing tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::markers::{MarkerSet, ProjectedMarker};
use crate::capture::Frame;
use crate::coord::{CoordinateTransform, GeoPoint};
use crate::fps::{AdaptiveFpsController, FpsSnapshot, RateHandle};
use crate::matcher::{CascadeScaleMatcher, MatchMode, MatchResult, TrackerState, Viewport};
use crate::telemetry::{LatencyWindow, PipelineMetrics};

/// Position published after an accepted tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionFix {
    pub frame_sequence: u64,
    pub state: TrackerState,
    pub mode: MatchMode,
    pub viewport: Viewport,
    /// Geographic position of the viewport centre.
    pub center: GeoPoint,
    pub confidence: f64,
    /// Markers visible in this frame, in frame pixels.
    pub markers: Vec<ProjectedMarker>,
    /// Capture-to-publish latency in milliseconds.
    pub latency_ms: f64,
}

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub result: MatchResult,
    pub fix: Option<PositionFix>,
    /// Time from capture to the end of processing.
    pub latency: Duration,
}

/// Frame → matcher → transform → markers, with FPS feedback.
///
/// Owns the only mutable tracking state, so it runs on a single thread.
#[derive(Debug)]
pub struct Pipeline {
    matcher: CascadeScaleMatcher,
    transform: Arc<CoordinateTransform>,
    markers: MarkerSet,
    fps: AdaptiveFpsController,
    metrics: Arc<PipelineMetrics>,
    latency: Arc<LatencyWindow>,
}

impl Pipeline {
    pub fn new(
        matcher: CascadeScaleMatcher,
        transform: Arc<CoordinateTransform>,
        markers: MarkerSet,
        fps: AdaptiveFpsController,
    ) -> Self {
        Self {
            matcher,
            transform,
            markers,
            fps,
            metrics: Arc::new(PipelineMetrics::new()),
            latency: Arc::new(LatencyWindow::default()),
        }
    }

    /// Process one frame.
    pub fn tick(&mut self, frame: &Frame) -> TickOutcome {
        let start = Instant::now();
        let previous_state = self.matcher.state();

        let gray = frame.to_gray();
        let result = self.matcher.step(&gray, frame.sequence());

        let fix = result.viewport.filter(|_| result.is_accepted()).map(|viewport| {
            let center = self.transform.to_geographic(viewport.center());
            PositionFix {
                frame_sequence: result.frame_sequence,
                state: result.state,
                mode: result.mode,
                viewport,
                center,
                confidence: result.confidence,
                markers: self.markers.visible(&viewport),
                latency_ms: 0.0,
            }
        });

        self.fps.on_frame_processed(start.elapsed());
        self.metrics.step_completed(&result, previous_state);

        let latency = frame.timestamp().elapsed();
        self.latency.record(latency);
        let fix = fix.map(|mut fix| {
            fix.latency_ms = latency.as_secs_f64() * 1000.0;
            fix
        });

        tracing::debug!(
            sequence = result.frame_sequence,
            state = %result.state,
            mode = %result.mode,
            confidence = format!("{:.2}", result.confidence),
            latency_ms = format!("{:.1}", latency.as_secs_f64() * 1000.0),
            "Tick processed"
        );

        TickOutcome {
            result,
            fix,
            latency,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.matcher.state()
    }

    pub fn matcher(&self) -> &CascadeScaleMatcher {
        &self.matcher
    }

    pub fn transform(&self) -> &Arc<CoordinateTransform> {
        &self.transform
    }

    /// Rate handle the capture loop should follow.
    pub fn rate_handle(&self) -> RateHandle {
        self.fps.rate_handle()
    }

    pub fn fps_snapshot(&self) -> FpsSnapshot {
        self.fps.snapshot()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn latency(&self) -> Arc<LatencyWindow> {
        Arc::clone(&self.latency)
    }
}
