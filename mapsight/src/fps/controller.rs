//! Closed-loop frame rate controller.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use super::policy::{next_rate, FpsConfig, RateAdjustment, RateDecision};
use super::RateHandle;

/// Read-only view of the controller for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FpsSnapshot {
    /// Active target rate.
    pub target_fps: f64,
    /// Utilization computed at the last adaptation (0 before the first).
    pub utilization: f64,
    /// Percentile processing time at the last adaptation, in milliseconds.
    pub percentile_ms: f64,
    /// Frames between adaptation decisions.
    pub adaptation_interval: u32,
    /// Samples currently in the window.
    pub samples: usize,
    /// Frames recorded since the last adaptation.
    pub frames_since_adaptation: u32,
    /// Number of decisions that changed the rate.
    pub adaptations: u64,
    /// Total frames recorded.
    pub frames_observed: u64,
}

/// Adaptive FPS controller.
///
/// Records per-frame processing durations in a bounded window and, every
/// `adaptation_interval` frames, asks [`next_rate`] for a new target. The
/// target is published through a [`RateHandle`] read by the capture loop.
///
/// # Example
///
/// ```ignore
/// let mut controller = AdaptiveFpsController::with_defaults();
/// let rate = controller.rate_handle(); // give to the capture service
///
/// let start = Instant::now();
/// process(frame);
/// controller.on_frame_processed(start.elapsed());
/// ```
#[derive(Debug)]
pub struct AdaptiveFpsController {
    config: FpsConfig,
    /// Recent processing durations in milliseconds.
    samples: VecDeque<f64>,
    frames_since_adaptation: u32,
    rate: RateHandle,
    last_utilization: f64,
    last_percentile_ms: f64,
    adaptations: u64,
    frames_observed: u64,
}

impl AdaptiveFpsController {
    /// Create a controller with its own rate handle.
    pub fn new(config: FpsConfig) -> Self {
        let rate = RateHandle::new(config.clamp_rate(config.initial_fps));
        Self::with_rate_handle(config, rate)
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FpsConfig::default())
    }

    /// Create a controller that drives an existing rate handle.
    ///
    /// The handle is reset to the configured initial rate.
    pub fn with_rate_handle(config: FpsConfig, rate: RateHandle) -> Self {
        rate.set(config.clamp_rate(config.initial_fps));
        Self {
            samples: VecDeque::with_capacity(config.window_size.max(1)),
            frames_since_adaptation: 0,
            rate,
            last_utilization: 0.0,
            last_percentile_ms: 0.0,
            adaptations: 0,
            frames_observed: 0,
            config,
        }
    }

    /// Record one frame's processing time.
    ///
    /// Returns the decision when this frame triggered an adaptation step.
    pub fn on_frame_processed(&mut self, duration: Duration) -> Option<RateDecision> {
        self.samples.push_back(duration.as_secs_f64() * 1000.0);
        while self.samples.len() > self.config.window_size.max(1) {
            self.samples.pop_front();
        }
        self.frames_observed += 1;
        self.frames_since_adaptation += 1;

        if self.frames_since_adaptation < self.config.adaptation_interval.max(1) {
            return None;
        }

        let samples = self.samples.make_contiguous();
        let decision = next_rate(self.rate.get(), samples, &self.config)?;
        self.frames_since_adaptation = 0;
        self.last_utilization = decision.utilization;
        self.last_percentile_ms = decision.percentile_ms;

        if decision.adjustment != RateAdjustment::Hold {
            let previous = self.rate.get();
            self.rate.set(decision.rate);
            self.adaptations += 1;
            tracing::debug!(
                from = format!("{:.1}", previous),
                to = format!("{:.1}", decision.rate),
                utilization = format!("{:.1}%", decision.utilization * 100.0),
                p_ms = format!("{:.1}", decision.percentile_ms),
                adjustment = %decision.adjustment,
                "Target FPS adapted"
            );
        }

        Some(decision)
    }

    /// Active target rate.
    pub fn current_target_fps(&self) -> f64 {
        self.rate.get()
    }

    /// Handle through which other threads observe the target rate.
    pub fn rate_handle(&self) -> RateHandle {
        self.rate.clone()
    }

    pub fn config(&self) -> &FpsConfig {
        &self.config
    }

    pub fn snapshot(&self) -> FpsSnapshot {
        FpsSnapshot {
            target_fps: self.rate.get(),
            utilization: self.last_utilization,
            percentile_ms: self.last_percentile_ms,
            adaptation_interval: self.config.adaptation_interval,
            samples: self.samples.len(),
            frames_since_adaptation: self.frames_since_adaptation,
            adaptations: self.adaptations,
            frames_observed: self.frames_observed,
        }
    }

    /// Drop all samples and return to the initial rate.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.frames_since_adaptation = 0;
        self.last_utilization = 0.0;
        self.last_percentile_ms = 0.0;
        self.rate.set(self.config.clamp_rate(self.config.initial_fps));
    }
}
