//! Coordinate value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns true if both components are finite.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A position in the reference map's native (full resolution) pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for MapPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// A position in detection space, the downscaled pixel grid used for matching.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionPoint {
    pub x: f64,
    pub y: f64,
}

impl DetectionPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offset this point by a displacement.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &DetectionPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl fmt::Display for DetectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// A control point tying a geographic position to a native map pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub geo: GeoPoint,
    pub pixel: MapPoint,
}

impl CalibrationPoint {
    /// Create a control point from `(lat, lng)` and native `(x, y)`.
    pub const fn new(lat: f64, lng: f64, x: f64, y: f64) -> Self {
        Self {
            geo: GeoPoint::new(lat, lng),
            pixel: MapPoint::new(x, y),
        }
    }

    /// Returns true if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.geo.is_finite() && self.pixel.x.is_finite() && self.pixel.y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_point_offset_and_distance() {
        let p = DetectionPoint::new(10.0, 20.0);
        let q = p.offset(3.0, 4.0);
        assert_eq!(q, DetectionPoint::new(13.0, 24.0));
        assert!((p.distance(&q) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_point_finite() {
        assert!(CalibrationPoint::new(-30.0, 118.0, 100.0, 200.0).is_finite());
        assert!(!CalibrationPoint::new(f64::NAN, 118.0, 100.0, 200.0).is_finite());
        assert!(!CalibrationPoint::new(-30.0, 118.0, f64::INFINITY, 200.0).is_finite());
    }

    #[test]
    fn test_geo_point_display() {
        let p = GeoPoint::new(-30.3914, 118.2733);
        assert_eq!(p.to_string(), "(-30.391400, 118.273300)");
    }
}
