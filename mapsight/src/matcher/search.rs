//! Single-level feature search against the reference map.

use std::sync::Arc;

use image::GrayImage;

use super::ScaleLevel;
use crate::features::{
    extract_features, fit_scale_translation, match_features, FeatureConfig, Region,
    ScaleTranslation,
};
use crate::reference::ReferenceMap;

/// Result of matching one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMatch {
    /// Maps level-image pixels to detection space.
    pub model: ScaleTranslation,
    /// Good descriptor matches.
    pub matches: usize,
    /// RANSAC inliers among `matches`.
    pub inliers: usize,
    pub confidence: f64,
}

/// Locates a (resampled) frame on the reference map.
///
/// The cascade drives levels and acceptance; implementors only answer "where
/// does this image sit, and how sure are you".
pub trait LevelMatcher: Send {
    /// Match `image` (the frame resampled for `level`), restricting the map
    /// to `region` when given.
    ///
    /// Returns `None` when too few matches support a fit.
    fn match_level(
        &self,
        image: &GrayImage,
        level: &ScaleLevel,
        region: Option<&Region>,
    ) -> Option<LevelMatch>;
}

/// [`LevelMatcher`] backed by binary features and RANSAC.
#[derive(Debug, Clone)]
pub struct FeatureMatcher {
    map: Arc<ReferenceMap>,
    config: FeatureConfig,
}

impl FeatureMatcher {
    pub fn new(map: Arc<ReferenceMap>, config: FeatureConfig) -> Self {
        Self { map, config }
    }

    pub fn map(&self) -> &Arc<ReferenceMap> {
        &self.map
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Map features to search: the region, or everything when the region
    /// holds too few.
    fn candidates(&self, level: &ScaleLevel, region: Option<&Region>) -> Vec<usize> {
        let index = self.map.index();
        if let Some(region) = region {
            let inside = index.query(region);
            if inside.len() >= level.min_matches.max(1) {
                return inside;
            }
            tracing::debug!(
                level = %level.name,
                inside = inside.len(),
                "Search region too sparse, using whole map"
            );
        }
        index.all()
    }
}

impl LevelMatcher for FeatureMatcher {
    fn match_level(
        &self,
        image: &GrayImage,
        level: &ScaleLevel,
        region: Option<&Region>,
    ) -> Option<LevelMatch> {
        let frame_features = extract_features(image, &self.config, level.max_features);
        if frame_features.len() < level.min_matches {
            tracing::debug!(
                level = %level.name,
                features = frame_features.len(),
                "Too few frame features"
            );
            return None;
        }

        let candidates = self.candidates(level, region);
        let map_features = self.map.index().features();
        let matches = match_features(
            &frame_features,
            map_features,
            &candidates,
            self.config.ratio,
            self.config.max_hamming,
        );
        if matches.len() < level.min_matches {
            tracing::debug!(
                level = %level.name,
                matches = matches.len(),
                required = level.min_matches,
                "Too few good matches"
            );
            return None;
        }

        let pairs: Vec<_> = matches
            .iter()
            .map(|m| {
                let q = frame_features[m.query].keypoint;
                let t = map_features[m.train].keypoint;
                ((q.x as f64, q.y as f64), (t.x as f64, t.y as f64))
            })
            .collect();
        let fit = fit_scale_translation(&pairs, &self.config.ransac)?;
        let confidence = self.config.confidence(fit.inliers.len(), matches.len());

        tracing::debug!(
            level = %level.name,
            matches = matches.len(),
            inliers = fit.inliers.len(),
            confidence = format!("{:.2}", confidence),
            "Level matched"
        );

        Some(LevelMatch {
            model: fit.model,
            matches: matches.len(),
            inliers: fit.inliers.len(),
            confidence,
        })
    }
}
