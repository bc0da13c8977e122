//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude),
//! the reference map's native pixel space, and the downscaled detection space
//! the matcher works in.
//!
//! ```text
//!   GeoPoint ──affine──► MapPoint ──× detection_scale──► DetectionPoint
//!   (lat, lng)            (native px)                    (matcher px)
//! ```
//!
//! The affine part is fitted by least squares from three or more calibration
//! control points. Both directions are evaluated in `f64` and are exact
//! inverses of each other up to rounding.
//!
//! # Example
//!
//! ```ignore
//! use mapsight::coord::{CalibrationPoint, CalibrationSet, CoordinateTransform, GeoPoint};
//!
//! let calibration = CalibrationSet::new(vec![
//!     CalibrationPoint::new(-30.3914, 118.2733, 14608.0, 2506.0),
//!     CalibrationPoint::new(-104.7555, 62.4881, 7494.0, 11995.0),
//!     CalibrationPoint::new(-78.4988, 93.5773, 11457.0, 8649.0),
//! ])?;
//! let transform = CoordinateTransform::new(&calibration, 0.5)?;
//!
//! let det = transform.to_detection_space(GeoPoint::new(-60.0, 100.0));
//! let geo = transform.to_geographic(det);
//! ```

mod types;

pub use types::{CalibrationPoint, DetectionPoint, GeoPoint, MapPoint};

use rayon::prelude::*;

use crate::error::SetupError;

/// Minimum number of control points needed to fit an affine transform.
pub const MIN_CALIBRATION_POINTS: usize = 3;

/// Batches at least this large are transformed on the rayon pool.
pub const PARALLEL_BATCH_THRESHOLD: usize = 1024;

/// Relative determinant below which a point configuration is treated as
/// collinear.
const DEGENERATE_DETERMINANT: f64 = 1e-12;

/// A validated, immutable set of calibration control points.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    points: Vec<CalibrationPoint>,
}

impl CalibrationSet {
    /// Validate a list of control points.
    ///
    /// # Errors
    ///
    /// * `CalibrationMissing` if the list is empty.
    /// * `InvalidCalibration` if there are fewer than three points or any
    ///   component is not finite.
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, SetupError> {
        if points.is_empty() {
            return Err(SetupError::CalibrationMissing);
        }
        if points.len() < MIN_CALIBRATION_POINTS {
            return Err(SetupError::InvalidCalibration(format!(
                "need at least {} control points, got {}",
                MIN_CALIBRATION_POINTS,
                points.len()
            )));
        }
        if let Some((i, _)) = points.iter().enumerate().find(|(_, p)| !p.is_finite()) {
            return Err(SetupError::InvalidCalibration(format!(
                "control point {} has a non-finite component",
                i + 1
            )));
        }
        Ok(Self { points })
    }

    /// The control points in load order.
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 2×2 linear part plus translation, applied as `m · v + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine2 {
    m: [[f64; 2]; 2],
    t: [f64; 2],
}

impl Affine2 {
    #[inline]
    fn apply(&self, a: f64, b: f64) -> (f64, f64) {
        (
            self.m[0][0] * a + self.m[0][1] * b + self.t[0],
            self.m[1][0] * a + self.m[1][1] * b + self.t[1],
        )
    }

    fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    fn inverse(&self) -> Option<Affine2> {
        let det = self.determinant();
        let scale = self.m.iter().flatten().map(|v| v * v).sum::<f64>();
        if !det.is_finite() || scale == 0.0 || det.abs() <= DEGENERATE_DETERMINANT * scale {
            return None;
        }
        let inv = [
            [self.m[1][1] / det, -self.m[0][1] / det],
            [-self.m[1][0] / det, self.m[0][0] / det],
        ];
        let t = [
            -(inv[0][0] * self.t[0] + inv[0][1] * self.t[1]),
            -(inv[1][0] * self.t[0] + inv[1][1] * self.t[1]),
        ];
        Some(Affine2 { m: inv, t })
    }
}

/// Calibrated mapping between geographic, native pixel and detection space.
#[derive(Debug, Clone)]
pub struct CoordinateTransform {
    /// `(lng, lat)` → native pixel.
    forward: Affine2,
    /// native pixel → `(lng, lat)`.
    inverse: Affine2,
    /// Detection pixels per native pixel.
    detection_scale: f64,
    /// Fit error of each control point in native pixels.
    residuals: Vec<f64>,
}

impl CoordinateTransform {
    /// Fit the transform to the calibration set.
    ///
    /// # Arguments
    ///
    /// * `calibration` - Validated control points
    /// * `detection_scale` - Detection pixels per native pixel (e.g. 0.5)
    ///
    /// # Errors
    ///
    /// Returns `InvalidCalibration` if the control points are collinear and
    /// `InvalidDetectionScale` if the scale is not a positive finite number.
    pub fn new(calibration: &CalibrationSet, detection_scale: f64) -> Result<Self, SetupError> {
        if !(detection_scale.is_finite() && detection_scale > 0.0) {
            return Err(SetupError::InvalidDetectionScale(detection_scale));
        }

        let forward = fit_affine(calibration.points())?;
        let inverse = forward.inverse().ok_or_else(|| {
            SetupError::InvalidCalibration("fitted transform is not invertible".to_string())
        })?;

        let residuals = calibration
            .points()
            .iter()
            .map(|p| {
                let (x, y) = forward.apply(p.geo.lng, p.geo.lat);
                (x - p.pixel.x).hypot(y - p.pixel.y)
            })
            .collect::<Vec<_>>();

        let max_residual = residuals.iter().copied().fold(0.0_f64, f64::max);
        tracing::info!(
            points = calibration.len(),
            detection_scale,
            max_residual_px = format!("{:.2}", max_residual),
            "Coordinate transform calibrated"
        );

        Ok(Self {
            forward,
            inverse,
            detection_scale,
            residuals,
        })
    }

    /// Detection pixels per native pixel.
    pub fn detection_scale(&self) -> f64 {
        self.detection_scale
    }

    /// Per-control-point fit error in native pixels, in load order.
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Geographic position → native map pixel.
    #[inline]
    pub fn to_native_pixel(&self, geo: GeoPoint) -> MapPoint {
        let (x, y) = self.forward.apply(geo.lng, geo.lat);
        MapPoint::new(x, y)
    }

    /// Native map pixel → geographic position.
    #[inline]
    pub fn native_to_geographic(&self, pixel: MapPoint) -> GeoPoint {
        let (lng, lat) = self.inverse.apply(pixel.x, pixel.y);
        GeoPoint::new(lat, lng)
    }

    #[inline]
    pub fn native_to_detection(&self, pixel: MapPoint) -> DetectionPoint {
        DetectionPoint::new(pixel.x * self.detection_scale, pixel.y * self.detection_scale)
    }

    #[inline]
    pub fn detection_to_native(&self, point: DetectionPoint) -> MapPoint {
        MapPoint::new(point.x / self.detection_scale, point.y / self.detection_scale)
    }

    /// Geographic position → detection space.
    #[inline]
    pub fn to_detection_space(&self, geo: GeoPoint) -> DetectionPoint {
        self.native_to_detection(self.to_native_pixel(geo))
    }

    /// Detection space → geographic position.
    #[inline]
    pub fn to_geographic(&self, point: DetectionPoint) -> GeoPoint {
        self.native_to_geographic(self.detection_to_native(point))
    }

    /// Transform many geographic points at once.
    ///
    /// Large batches are split across the rayon pool; output order matches
    /// input order.
    pub fn to_detection_space_batch(&self, points: &[GeoPoint]) -> Vec<DetectionPoint> {
        if points.len() >= PARALLEL_BATCH_THRESHOLD {
            points
                .par_iter()
                .map(|p| self.to_detection_space(*p))
                .collect()
        } else {
            points.iter().map(|p| self.to_detection_space(*p)).collect()
        }
    }

    /// Transform many detection-space points back to geographic positions.
    pub fn to_geographic_batch(&self, points: &[DetectionPoint]) -> Vec<GeoPoint> {
        if points.len() >= PARALLEL_BATCH_THRESHOLD {
            points.par_iter().map(|p| self.to_geographic(*p)).collect()
        } else {
            points.iter().map(|p| self.to_geographic(*p)).collect()
        }
    }
}

/// Least-squares affine fit of native pixels against `(lng, lat)`.
///
/// Works on centred coordinates so that the normal equations stay well
/// conditioned for large pixel offsets.
fn fit_affine(points: &[CalibrationPoint]) -> Result<Affine2, SetupError> {
    let n = points.len() as f64;
    let (mut mg0, mut mg1, mut mp0, mut mp1) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        mg0 += p.geo.lng;
        mg1 += p.geo.lat;
        mp0 += p.pixel.x;
        mp1 += p.pixel.y;
    }
    mg0 /= n;
    mg1 /= n;
    mp0 /= n;
    mp1 /= n;

    // Normal matrix S = Σ g gᵀ and cross terms C_r = Σ g p_r (centred).
    let (mut s00, mut s01, mut s11) = (0.0, 0.0, 0.0);
    let (mut c0x, mut c1x, mut c0y, mut c1y) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        let g0 = p.geo.lng - mg0;
        let g1 = p.geo.lat - mg1;
        let px = p.pixel.x - mp0;
        let py = p.pixel.y - mp1;
        s00 += g0 * g0;
        s01 += g0 * g1;
        s11 += g1 * g1;
        c0x += g0 * px;
        c1x += g1 * px;
        c0y += g0 * py;
        c1y += g1 * py;
    }

    let det = s00 * s11 - s01 * s01;
    let trace = s00 + s11;
    if !det.is_finite() || trace == 0.0 || det.abs() <= DEGENERATE_DETERMINANT * trace * trace {
        return Err(SetupError::InvalidCalibration(
            "control points are collinear".to_string(),
        ));
    }

    // Row r of the linear part solves S · m_r = C_r.
    let solve = |c0: f64, c1: f64| [(s11 * c0 - s01 * c1) / det, (s00 * c1 - s01 * c0) / det];
    let row_x = solve(c0x, c1x);
    let row_y = solve(c0y, c1y);

    let m = [row_x, row_y];
    let t = [
        mp0 - (m[0][0] * mg0 + m[0][1] * mg1),
        mp1 - (m[1][0] * mg0 + m[1][1] * mg1),
    ];
    Ok(Affine2 { m, t })
}
