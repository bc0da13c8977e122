//! Binary feature toolkit used for absolute anchoring.
//!
//! ```text
//!  GrayImage ─► fast::detect ─► top-N by response ─► orientation ─► BRIEF
//!                                                                    │
//!  FeatureIndex (map) ◄── query(region) ── match_features ◄──────────┘
//!                                              │
//!                              fit_scale_translation (RANSAC)
//! ```
//!
//! Detection and description are local operations: a feature found in a
//! crop of the reference map has the same position (offset by the crop
//! origin) and descriptor as in the full map, which is what lets a frame be
//! matched back to the map.

mod brief;
mod fast;
mod index;
mod matching;
mod ransac;

use image::GrayImage;
use rayon::prelude::*;

pub use index::{FeatureIndex, Region, DEFAULT_CELL_SIZE};
pub use matching::{hamming, match_features, Correspondence};
pub use ransac::{
    fit_scale_translation, RansacConfig, RansacFit, ScaleTranslation, DEFAULT_INLIER_THRESHOLD,
    DEFAULT_RANSAC_ITERATIONS,
};

/// Descriptor length in bytes (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// Packed binary descriptor.
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// Detected corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// FAST score; larger is stronger.
    pub response: f32,
    /// Orientation in radians.
    pub angle: f32,
}

/// Keypoint with its descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// Feature extraction and matching parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    /// FAST intensity threshold (default: 20).
    pub fast_threshold: u8,

    /// Keypoints closer than this to the image edge are ignored (default: 24).
    ///
    /// Must cover the rotated descriptor pattern and the orientation disc.
    pub border: u32,

    /// Upper bound on reference map features (default: 200_000).
    pub max_map_features: usize,

    /// Gaussian sigma applied before descriptor sampling (default: 1.2).
    pub blur_sigma: f32,

    /// Lowe ratio for accepting a match (default: 0.75).
    pub ratio: f32,

    /// Largest accepted Hamming distance (default: 64).
    pub max_hamming: u32,

    /// Inlier count at which confidence stops growing (default: 20).
    pub saturation_inliers: usize,

    /// Map grid cell size for region queries (default: 128).
    pub index_cell_size: f32,

    /// RANSAC settings.
    pub ransac: RansacConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            border: 24,
            max_map_features: 200_000,
            blur_sigma: 1.2,
            ratio: 0.75,
            max_hamming: 64,
            saturation_inliers: 20,
            index_cell_size: DEFAULT_CELL_SIZE,
            ransac: RansacConfig::default(),
        }
    }
}

impl FeatureConfig {
    /// Anchor confidence: inlier ratio scaled down until enough inliers
    /// support the fit.
    pub fn confidence(&self, inliers: usize, matches: usize) -> f64 {
        if matches == 0 || inliers == 0 {
            return 0.0;
        }
        let ratio = inliers as f64 / matches as f64;
        let support = (inliers as f64 / self.saturation_inliers.max(1) as f64).min(1.0);
        (ratio * support).clamp(0.0, 1.0)
    }
}

/// Detect and describe up to `max_features` of the strongest corners.
///
/// Output is sorted by descending response, ties broken by position, so it
/// is deterministic regardless of thread scheduling.
pub fn extract_features(image: &GrayImage, config: &FeatureConfig, max_features: usize) -> Vec<Feature> {
    let mut keypoints = fast::detect(image, config.fast_threshold, config.border);
    if keypoints.is_empty() || max_features == 0 {
        return Vec::new();
    }

    keypoints.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });
    keypoints.truncate(max_features);

    let smoothed = if config.blur_sigma > 0.0 {
        image::imageops::blur(image, config.blur_sigma)
    } else {
        image.clone()
    };

    keypoints
        .into_par_iter()
        .filter_map(|mut keypoint| {
            let (x, y) = (keypoint.x as u32, keypoint.y as u32);
            keypoint.angle = brief::orientation(image, x, y);
            let descriptor = brief::describe(&smoothed, x, y, keypoint.angle)?;
            Some(Feature {
                keypoint,
                descriptor,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blocks(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells: Vec<u8> = (0..(width / 8 + 1) * (height / 8 + 1))
            .map(|_| rng.random_range(0..=255))
            .collect();
        let stride = width / 8 + 1;
        GrayImage::from_fn(width, height, |x, y| Luma([cells[((y / 8) * stride + x / 8) as usize]]))
    }

    #[test]
    fn test_confidence() {
        let config = FeatureConfig::default();
        assert_eq!(config.confidence(0, 10), 0.0);
        assert_eq!(config.confidence(5, 0), 0.0);
        assert!((config.confidence(20, 20) - 1.0).abs() < 1e-12);
        assert!((config.confidence(10, 10) - 0.5).abs() < 1e-12);
        assert!((config.confidence(40, 50) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_extract_respects_limit_and_order() {
        let img = blocks(200, 200, 7);
        let config = FeatureConfig::default();
        let features = extract_features(&img, &config, 50);
        assert!(!features.is_empty());
        assert!(features.len() <= 50);
        for pair in features.windows(2) {
            assert!(pair[0].keypoint.response >= pair[1].keypoint.response);
        }
    }

    #[test]
    fn test_extract_flat_image() {
        let img = GrayImage::from_pixel(100, 100, Luma([90]));
        assert!(extract_features(&img, &FeatureConfig::default(), 100).is_empty());
    }

    #[test]
    fn test_crop_matches_back_to_source() {
        let map = blocks(400, 300, 11);
        let config = FeatureConfig::default();
        let map_features = extract_features(&map, &config, config.max_map_features);
        let index = FeatureIndex::new(map_features, 400, 300, config.index_cell_size);

        let (ox, oy) = (120u32, 70u32);
        let frame = image::imageops::crop_imm(&map, ox, oy, 160, 120).to_image();
        let frame_features = extract_features(&frame, &config, 300);

        let matches = match_features(
            &frame_features,
            index.features(),
            &index.all(),
            config.ratio,
            config.max_hamming,
        );
        let pairs: Vec<_> = matches
            .iter()
            .map(|m| {
                let q = frame_features[m.query].keypoint;
                let t = index.features()[m.train].keypoint;
                ((q.x as f64, q.y as f64), (t.x as f64, t.y as f64))
            })
            .collect();
        let fit = fit_scale_translation(&pairs, &config.ransac).unwrap();
        assert!((fit.model.scale - 1.0).abs() < 0.01);
        assert!((fit.model.tx - ox as f64).abs() < 1.0);
        assert!((fit.model.ty - oy as f64).abs() < 1.0);
        assert!(fit.inliers.len() >= 8);
    }
}
