//! Projection of geographic markers into the current frame.

use serde::{Deserialize, Serialize};

use crate::coord::{CoordinateTransform, DetectionPoint, GeoPoint};
use crate::matcher::Viewport;

/// A geographic point of interest to overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub position: GeoPoint,
}

impl Marker {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            position: GeoPoint::new(lat, lng),
        }
    }
}

/// A marker placed in frame (screen) pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedMarker {
    pub id: String,
    pub position: GeoPoint,
    pub screen_x: f64,
    pub screen_y: f64,
}

/// Fixed marker set with detection-space positions computed once.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
    detection: Vec<DetectionPoint>,
}

impl MarkerSet {
    pub fn new(markers: Vec<Marker>, transform: &CoordinateTransform) -> Self {
        let geo: Vec<GeoPoint> = markers.iter().map(|m| m.position).collect();
        let detection = transform.to_detection_space_batch(&geo);
        Self { markers, detection }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers inside `viewport`, in frame pixels.
    pub fn visible(&self, viewport: &Viewport) -> Vec<ProjectedMarker> {
        self.markers
            .iter()
            .zip(&self.detection)
            .filter(|(_, point)| viewport.contains(**point))
            .map(|(marker, point)| {
                let (screen_x, screen_y) = viewport.to_frame(*point);
                ProjectedMarker {
                    id: marker.id.clone(),
                    position: marker.position,
                    screen_x,
                    screen_y,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{CalibrationPoint, CalibrationSet};

    /// 1 native pixel per 0.001°, origin at (lat 10, lng 20), detection at half scale.
    fn transform() -> CoordinateTransform {
        let calibration = CalibrationSet::new(vec![
            CalibrationPoint::new(10.0, 20.0, 0.0, 0.0),
            CalibrationPoint::new(10.0, 21.0, 1000.0, 0.0),
            CalibrationPoint::new(9.0, 20.0, 0.0, 1000.0),
        ])
        .unwrap();
        CoordinateTransform::new(&calibration, 0.5).unwrap()
    }

    #[test]
    fn test_visible_markers_projected_to_screen() {
        let transform = transform();
        let markers = MarkerSet::new(
            vec![
                Marker::new("inside", 9.9, 20.2),  // native (200, 100) → det (100, 50)
                Marker::new("outside", 9.0, 21.0), // det (500, 500)
            ],
            &transform,
        );
        assert_eq!(markers.len(), 2);

        let viewport = Viewport::from_origin(DetectionPoint::new(80.0, 40.0), 100, 100, 0.5, 1.0);
        let visible = markers.visible(&viewport);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "inside");
        assert!((visible[0].screen_x - 40.0).abs() < 1e-6);
        assert!((visible[0].screen_y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_set() {
        let markers = MarkerSet::default();
        let viewport = Viewport::from_origin(DetectionPoint::new(0.0, 0.0), 10, 10, 1.0, 1.0);
        assert!(markers.visible(&viewport).is_empty());
        assert!(markers.is_empty());
    }
}
