//! Rate adaptation policy.
//!
//! [`next_rate`] is a pure function of the current rate and a window of
//! processing durations. Utilization is the chosen percentile of the window
//! divided by the current frame interval:
//!
//! ```text
//!   0 ─────── low (60%) ════ dead band ════ high (85%) ─────── ∞
//!     grow ×1.5, capped       hold           shrink to target,
//!     at target utilization                  at least ×0.7
//! ```
//!
//! Growth never overshoots the dead-band midpoint, and shrinking always
//! lands inside the band, so a constant load converges to a fixed rate
//! instead of bouncing between the two thresholds.

use std::fmt;

use serde::Serialize;

/// Default floor rate.
pub const DEFAULT_FLOOR_FPS: f64 = 5.0;

/// Configuration for the adaptive frame rate controller.
#[derive(Debug, Clone, PartialEq)]
pub struct FpsConfig {
    /// Hard minimum rate; the controller never goes below it (default: 5).
    pub floor_fps: f64,

    /// Starting rate, clamped to the floor (default: 5).
    pub initial_fps: f64,

    /// Optional ceiling. `None` lets the rate follow the host (default: `None`).
    pub max_fps: Option<f64>,

    /// Frames between adaptation decisions (default: 3).
    pub adaptation_interval: u32,

    /// Processing-time samples kept in the sliding window (default: 10).
    pub window_size: usize,

    /// Samples required before the first decision (default: 3).
    pub min_samples: usize,

    /// Percentile of the window used as the load estimate (default: 0.9).
    pub percentile: f64,

    /// Utilization below which the rate grows (default: 0.6).
    pub low_utilization: f64,

    /// Utilization above which the rate shrinks (default: 0.85).
    pub high_utilization: f64,

    /// Multiplicative growth step (default: 1.5).
    pub increase_factor: f64,

    /// Minimum multiplicative shrink step (default: 0.7).
    pub decrease_factor: f64,
}

impl Default for FpsConfig {
    fn default() -> Self {
        Self {
            floor_fps: DEFAULT_FLOOR_FPS,
            initial_fps: DEFAULT_FLOOR_FPS,
            max_fps: None,
            adaptation_interval: 3,
            window_size: 10,
            min_samples: 3,
            percentile: 0.9,
            low_utilization: 0.6,
            high_utilization: 0.85,
            increase_factor: 1.5,
            decrease_factor: 0.7,
        }
    }
}

impl FpsConfig {
    /// Utilization the controller steers towards (dead-band midpoint).
    pub fn target_utilization(&self) -> f64 {
        (self.low_utilization + self.high_utilization) / 2.0
    }

    /// Clamp a candidate rate to the floor and optional ceiling.
    pub fn clamp_rate(&self, fps: f64) -> f64 {
        let fps = fps.max(self.floor_fps);
        match self.max_fps {
            Some(max) => fps.min(max.max(self.floor_fps)),
            None => fps,
        }
    }
}

/// Direction of a rate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateAdjustment {
    Increase,
    Decrease,
    Hold,
}

impl fmt::Display for RateAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateAdjustment::Increase => write!(f, "increase"),
            RateAdjustment::Decrease => write!(f, "decrease"),
            RateAdjustment::Hold => write!(f, "hold"),
        }
    }
}

/// Outcome of one adaptation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    /// Rate to use from now on.
    pub rate: f64,
    /// Load estimate over the current frame interval.
    pub utilization: f64,
    /// Percentile processing time in milliseconds.
    pub percentile_ms: f64,
    pub adjustment: RateAdjustment,
}

/// Linear-interpolated percentile (`q` in `[0, 1]`) of unsorted samples.
///
/// Returns `None` for an empty slice.
pub fn percentile(samples: &[f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Decide the next target rate.
///
/// # Arguments
///
/// * `current_fps` - Rate in effect while the samples were taken
/// * `samples_ms` - Recent processing durations in milliseconds
/// * `config` - Thresholds and step sizes
///
/// # Returns
///
/// `None` while fewer than `config.min_samples` samples are available.
pub fn next_rate(current_fps: f64, samples_ms: &[f64], config: &FpsConfig) -> Option<RateDecision> {
    if samples_ms.len() < config.min_samples.max(1) {
        return None;
    }
    let current_fps = config.clamp_rate(current_fps);
    let percentile_ms = percentile(samples_ms, config.percentile)?;
    let interval_ms = 1000.0 / current_fps;
    let utilization = percentile_ms / interval_ms;
    let target = config.target_utilization();

    let (factor, adjustment) = if utilization < config.low_utilization {
        let cap = if utilization > 0.0 {
            target / utilization
        } else {
            f64::INFINITY
        };
        (config.increase_factor.min(cap), RateAdjustment::Increase)
    } else if utilization > config.high_utilization {
        let restore = target / utilization;
        (config.decrease_factor.min(restore), RateAdjustment::Decrease)
    } else {
        (1.0, RateAdjustment::Hold)
    };

    let rate = config.clamp_rate(current_fps * factor);
    let adjustment = if rate == current_fps {
        RateAdjustment::Hold
    } else {
        adjustment
    };

    Some(RateDecision {
        rate,
        utilization,
        percentile_ms,
        adjustment,
    })
}
