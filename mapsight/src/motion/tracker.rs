//! Phase-correlation displacement estimator.

use std::f64::consts::PI;
use std::fmt;

use image::GrayImage;
use rustfft::num_complex::Complex;

use super::fft::Fft2d;
use crate::imaging;

/// Smallest downscaled side length the tracker will correlate.
const MIN_CORRELATION_SIDE: usize = 8;

/// Configuration for motion tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Frames are resampled by this factor before correlation (default: 0.25).
    ///
    /// Smaller is cheaper but coarser.
    pub downscale: f64,

    /// Frames whose intensity standard deviation is below this are treated as
    /// featureless (default: 2.0 grey levels).
    pub min_texture_stddev: f64,

    /// Peak-to-sidelobe ratio mapped to confidence 0 (default: 5.0).
    ///
    /// Unrelated frames rarely exceed 4.5.
    pub psr_floor: f64,

    /// Peak-to-sidelobe ratio mapped to confidence 1 (default: 12.0).
    pub psr_ceiling: f64,

    /// Half-size of the window around the peak excluded from the sidelobe
    /// statistics (default: 5, i.e. 11×11).
    pub sidelobe_exclusion: usize,

    /// Apply a Hann window before transforming (default: true).
    pub apply_window: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            downscale: 0.25,
            min_texture_stddev: 2.0,
            psr_floor: 5.0,
            psr_ceiling: 12.0,
            sidelobe_exclusion: 5,
            apply_window: true,
        }
    }
}

/// A frame prepared for correlation: downscaled, as `f64`, with its
/// texture statistics.
#[derive(Clone)]
pub struct MotionFrame {
    pixels: Vec<f64>,
    width: usize,
    height: usize,
    /// Downscaled pixels per input pixel, per axis.
    scale_x: f64,
    scale_y: f64,
    stddev: f64,
}

impl fmt::Debug for MotionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stddev", &self.stddev)
            .finish_non_exhaustive()
    }
}

impl MotionFrame {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Intensity standard deviation of the downscaled frame.
    pub fn stddev(&self) -> f64 {
        self.stddev
    }
}

/// Result of correlating two frames.
///
/// `dx`/`dy` are in input (full resolution) pixels and describe how far the
/// view moved: content at `p + (dx, dy)` in the reference appears at `p` in
/// the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub dx: f64,
    pub dy: f64,
    /// Confidence in `[0, 1]` derived from peak sharpness.
    pub confidence: f64,
    /// Raw peak-to-sidelobe ratio.
    pub peak_to_sidelobe: f64,
    /// True if either input was featureless.
    pub degenerate: bool,
}

impl MotionEstimate {
    /// Zero-confidence result for featureless input.
    pub fn degenerate() -> Self {
        Self {
            dx: 0.0,
            dy: 0.0,
            confidence: 0.0,
            peak_to_sidelobe: 0.0,
            degenerate: true,
        }
    }

    /// Displacement magnitude in input pixels.
    pub fn magnitude(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// Estimates translation between consecutive frames with phase correlation.
///
/// # Algorithm
///
/// ```text
///   ref, cur ──downscale──► mean-subtract + Hann ──FFT──► A, B
///   R = A·B̄ / |A·B̄|  ──IFFT──► r(x, y)
///   peak(r)      → displacement (3×3 centroid for sub-pixel)
///   PSR(r)       → confidence
/// ```
///
/// # Example
///
/// ```ignore
/// let mut tracker = MotionTracker::with_defaults();
/// let previous = tracker.prepare(&previous_gray);
/// let current = tracker.prepare(&current_gray);
/// let estimate = tracker.estimate(&previous, &current);
/// if estimate.confidence >= 0.5 {
///     position = position.offset(estimate.dx, estimate.dy);
/// }
/// ```
#[derive(Debug)]
pub struct MotionTracker {
    config: MotionConfig,
    fft: Fft2d,
}

impl MotionTracker {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            fft: Fft2d::new(),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MotionConfig::default())
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Downscale a grayscale frame and compute its texture statistics.
    pub fn prepare(&self, frame: &GrayImage) -> MotionFrame {
        let factor = if self.config.downscale > 0.0 && self.config.downscale <= 1.0 {
            self.config.downscale
        } else {
            1.0
        };
        let small = imaging::rescale(frame, factor);
        let (_, stddev) = imaging::mean_stddev(&small);
        let scale_x = small.width() as f64 / frame.width().max(1) as f64;
        let scale_y = small.height() as f64 / frame.height().max(1) as f64;

        MotionFrame {
            width: small.width() as usize,
            height: small.height() as usize,
            pixels: small.as_raw().iter().map(|&v| v as f64).collect(),
            scale_x,
            scale_y,
            stddev,
        }
    }

    /// Convenience wrapper preparing both images and correlating them.
    pub fn estimate_images(&mut self, reference: &GrayImage, current: &GrayImage) -> MotionEstimate {
        let reference = self.prepare(reference);
        let current = self.prepare(current);
        self.estimate(&reference, &current)
    }

    /// Estimate the displacement from `reference` to `current`.
    ///
    /// Frames of different sizes are compared over their common top-left
    /// region. Featureless frames yield [`MotionEstimate::degenerate`].
    pub fn estimate(&mut self, reference: &MotionFrame, current: &MotionFrame) -> MotionEstimate {
        if reference.stddev < self.config.min_texture_stddev
            || current.stddev < self.config.min_texture_stddev
        {
            return MotionEstimate::degenerate();
        }

        let width = reference.width.min(current.width);
        let height = reference.height.min(current.height);
        if width < MIN_CORRELATION_SIDE || height < MIN_CORRELATION_SIDE {
            return MotionEstimate::degenerate();
        }

        let window = if self.config.apply_window {
            Some((hann(width), hann(height)))
        } else {
            None
        };
        let mut a = to_complex(reference, width, height, window.as_ref());
        let mut b = to_complex(current, width, height, window.as_ref());

        self.fft.forward(&mut a, width, height);
        self.fft.forward(&mut b, width, height);

        // Normalised cross-power spectrum, written into `a`.
        for (fa, fb) in a.iter_mut().zip(&b) {
            let cross = *fa * fb.conj();
            let magnitude = cross.norm();
            *fa = if magnitude > 1e-12 {
                cross / magnitude
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        self.fft.inverse(&mut a, width, height);
        let n = (width * height) as f64;
        let surface: Vec<f64> = a.iter().map(|c| c.re / n).collect();

        let (peak_index, _) = surface
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        let peak_x = peak_index % width;
        let peak_y = peak_index / width;

        let psr = peak_to_sidelobe(
            &surface,
            width,
            height,
            peak_x,
            peak_y,
            self.config.sidelobe_exclusion,
        );

        let (sub_x, sub_y) = centroid_offset(&surface, width, height, peak_x, peak_y);
        let shift_x = wrap_signed(peak_x, width) as f64 + sub_x;
        let shift_y = wrap_signed(peak_y, height) as f64 + sub_y;

        let span = (self.config.psr_ceiling - self.config.psr_floor).max(f64::EPSILON);
        let confidence = ((psr - self.config.psr_floor) / span).clamp(0.0, 1.0);

        MotionEstimate {
            dx: shift_x / reference.scale_x,
            dy: shift_y / reference.scale_y,
            confidence,
            peak_to_sidelobe: psr,
            degenerate: false,
        }
    }
}

/// Periodic Hann window of length `n`.
fn hann(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Mean-subtracted (optionally windowed) complex copy of the top-left
/// `width × height` region.
fn to_complex(
    frame: &MotionFrame,
    width: usize,
    height: usize,
    window: Option<&(Vec<f64>, Vec<f64>)>,
) -> Vec<Complex<f64>> {
    let mut sum = 0.0;
    for y in 0..height {
        let row = &frame.pixels[y * frame.width..y * frame.width + width];
        sum += row.iter().sum::<f64>();
    }
    let mean = sum / (width * height) as f64;

    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let mut v = frame.pixels[y * frame.width + x] - mean;
            if let Some((wx, wy)) = window {
                v *= wx[x] * wy[y];
            }
            out.push(Complex::new(v, 0.0));
        }
    }
    out
}

/// Map an FFT index to a signed shift.
fn wrap_signed(index: usize, len: usize) -> isize {
    if index > len / 2 {
        index as isize - len as isize
    } else {
        index as isize
    }
}

/// Peak-to-sidelobe ratio excluding a square around the peak.
///
/// A perfectly clean surface (identical frames) has near-zero sidelobe
/// spread; the floor on the deviation keeps the ratio finite.
fn peak_to_sidelobe(
    surface: &[f64],
    width: usize,
    height: usize,
    peak_x: usize,
    peak_y: usize,
    exclusion: usize,
) -> f64 {
    let near = |a: usize, b: usize, len: usize| {
        let d = a.abs_diff(b);
        d.min(len - d) <= exclusion
    };

    let (mut sum, mut sum_sq, mut count) = (0.0, 0.0, 0usize);
    for y in 0..height {
        let y_near = near(y, peak_y, height);
        for x in 0..width {
            if y_near && near(x, peak_x, width) {
                continue;
            }
            let v = surface[y * width + x];
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }
    if count < 2 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let std = (sum_sq / count as f64 - mean * mean).max(0.0).sqrt().max(1e-9);
    (surface[peak_y * width + peak_x] - mean) / std
}

/// Sub-pixel offset of the peak from the 3×3 weighted centroid.
fn centroid_offset(
    surface: &[f64],
    width: usize,
    height: usize,
    peak_x: usize,
    peak_y: usize,
) -> (f64, f64) {
    let (mut total, mut ox, mut oy) = (0.0, 0.0, 0.0);
    for dy in -1isize..=1 {
        for dx in -1isize..=1 {
            let x = (peak_x as isize + dx).rem_euclid(width as isize) as usize;
            let y = (peak_y as isize + dy).rem_euclid(height as isize) as usize;
            let w = surface[y * width + x].max(0.0);
            total += w;
            ox += w * dx as f64;
            oy += w * dy as f64;
        }
    }
    if total > 0.0 {
        (ox / total, oy / total)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::texture;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn crop(img: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        imaging::crop(img, x, y, w, h)
    }

    fn tracker(downscale: f64) -> MotionTracker {
        MotionTracker::new(MotionConfig {
            downscale,
            ..Default::default()
        })
    }

    #[test]
    fn test_default_config() {
        let config = MotionConfig::default();
        assert_eq!(config.downscale, 0.25);
        assert!(config.apply_window);
        assert!(config.psr_ceiling > config.psr_floor);
    }

    #[test]
    fn test_recovers_synthetic_shift_full_resolution() {
        let tex = texture(256, 256, 7);
        let reference = crop(&tex, 64, 64, 128, 128);
        let shifted = crop(&tex, 64 + 12, 64 - 7, 128, 128);

        let estimate = tracker(1.0).estimate_images(&reference, &shifted);
        assert!(!estimate.degenerate);
        assert!((estimate.dx - 12.0).abs() <= 1.0, "dx = {}", estimate.dx);
        assert!((estimate.dy + 7.0).abs() <= 1.0, "dy = {}", estimate.dy);
        assert!(estimate.confidence > 0.8, "confidence = {}", estimate.confidence);
    }

    #[test]
    fn test_recovers_shift_when_downscaled() {
        let tex = texture(384, 384, 11);
        let reference = crop(&tex, 64, 64, 256, 256);
        let shifted = crop(&tex, 64 + 12, 64 - 8, 256, 256);

        for downscale in [0.5, 0.25] {
            let estimate = tracker(downscale).estimate_images(&reference, &shifted);
            assert!(
                (estimate.dx - 12.0).abs() <= 1.0 && (estimate.dy + 8.0).abs() <= 1.0,
                "downscale {}: ({}, {})",
                downscale,
                estimate.dx,
                estimate.dy
            );
            assert!(estimate.confidence > 0.5, "downscale {}: {}", downscale, estimate.confidence);
        }
    }

    #[test]
    fn test_identical_frames_zero_shift() {
        let tex = texture(128, 96, 3);
        let estimate = tracker(0.5).estimate_images(&tex, &tex);
        assert!(estimate.magnitude() < 0.5);
        assert!(estimate.confidence > 0.9);
    }

    #[test]
    fn test_uniform_frame_is_degenerate() {
        let uniform = GrayImage::from_pixel(128, 96, Luma([90]));
        let tex = texture(128, 96, 5);

        let mut tracker = MotionTracker::with_defaults();
        for (a, b) in [(&uniform, &tex), (&tex, &uniform), (&uniform, &uniform)] {
            let estimate = tracker.estimate_images(a, b);
            assert!(estimate.degenerate);
            assert_eq!(estimate.confidence, 0.0);
            assert_eq!((estimate.dx, estimate.dy), (0.0, 0.0));
        }
    }

    #[test]
    fn test_unrelated_frames_low_confidence() {
        let a = texture(128, 128, 21);
        let mut rng = StdRng::seed_from_u64(99);
        let noise = GrayImage::from_fn(128, 128, |_, _| Luma([rng.random_range(0..=255u8)]));

        let estimate = tracker(0.5).estimate_images(&a, &noise);
        assert!(!estimate.degenerate);
        assert!(estimate.confidence < 0.5, "confidence = {}", estimate.confidence);
    }

    #[test]
    fn test_tiny_frame_is_degenerate() {
        let tex = texture(16, 16, 1);
        // 16 × 0.25 = 4 pixels per side, below the correlation minimum
        let estimate = MotionTracker::with_defaults().estimate_images(&tex, &tex);
        assert!(estimate.degenerate);
    }

    #[test]
    fn test_wrap_signed() {
        assert_eq!(wrap_signed(0, 64), 0);
        assert_eq!(wrap_signed(12, 64), 12);
        assert_eq!(wrap_signed(32, 64), 32);
        assert_eq!(wrap_signed(57, 64), -7);
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        assert!((w[2] - w[6]).abs() < 1e-12);
    }
}
