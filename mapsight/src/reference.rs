//! The fixed reference map and its precomputed features.

use std::path::Path;
use std::time::Instant;

use image::GrayImage;

use crate::error::SetupError;
use crate::features::{extract_features, FeatureConfig, FeatureIndex};
use crate::imaging::PreprocessConfig;

/// Grayscale reference raster at detection scale.
///
/// Built once at startup and shared read-only (`Arc<ReferenceMap>`) with the
/// matcher. Construction applies the matching preprocessing, extracts every
/// feature of the raster and buckets them for region queries. Frames are
/// later preprocessed with the same [`PreprocessConfig`].
#[derive(Debug)]
pub struct ReferenceMap {
    image: GrayImage,
    detection_scale: f64,
    preprocess: PreprocessConfig,
    index: FeatureIndex,
}

impl ReferenceMap {
    /// Wrap a raster used as is.
    ///
    /// `detection_scale` is the ratio of detection pixels to native map
    /// pixels (e.g. `0.5` when the raster was downscaled by half).
    pub fn new(
        image: GrayImage,
        detection_scale: f64,
        features: &FeatureConfig,
    ) -> Result<Self, SetupError> {
        Self::with_preprocess(image, detection_scale, features, PreprocessConfig::default())
    }

    /// Preprocess the raster, then index it.
    pub fn with_preprocess(
        mut image: GrayImage,
        detection_scale: f64,
        features: &FeatureConfig,
        preprocess: PreprocessConfig,
    ) -> Result<Self, SetupError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SetupError::EmptyReferenceMap);
        }
        if !detection_scale.is_finite() || detection_scale <= 0.0 {
            return Err(SetupError::InvalidDetectionScale(detection_scale));
        }

        let start = Instant::now();
        preprocess.apply(&mut image);
        let extracted = extract_features(&image, features, features.max_map_features);
        let index = FeatureIndex::new(
            extracted,
            image.width(),
            image.height(),
            features.index_cell_size,
        );

        tracing::info!(
            width = image.width(),
            height = image.height(),
            detection_scale,
            posterize = preprocess.posterize_levels,
            equalize = preprocess.equalize_clip_limit,
            features = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reference map indexed"
        );
        if index.is_empty() {
            tracing::warn!("Reference map has no detectable features; anchoring will fail");
        }

        Ok(Self {
            image,
            detection_scale,
            preprocess,
            index,
        })
    }

    /// Load a raster from disk, convert it to grayscale and preprocess it.
    pub fn load(
        path: impl AsRef<Path>,
        detection_scale: f64,
        features: &FeatureConfig,
        preprocess: PreprocessConfig,
    ) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| SetupError::ReferenceMapMissing {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_luma8();
        Self::with_preprocess(image, detection_scale, features, preprocess)
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn detection_scale(&self) -> f64 {
        self.detection_scale
    }

    /// Preprocessing the raster went through; frames must match it.
    pub fn preprocess(&self) -> PreprocessConfig {
        self.preprocess
    }

    /// Precomputed map features.
    pub fn index(&self) -> &FeatureIndex {
        &self.index
    }
}
