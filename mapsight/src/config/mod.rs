//! INI configuration file.
//!
//! Every key is optional; missing keys keep the component defaults.
//!
//! ```ini
//! [map]
//! path = /data/world.png
//! detection_scale = 0.5
//! posterize = 0
//! equalize_clip = 0
//! equalize_tiles = 8
//!
//! [calibration]
//! ; lat, lng, x, y (native map pixels)
//! point.1 = 48.8566, 2.3522, 1024, 768
//! point.2 = 51.5074, -0.1278, 880, 512
//! point.3 = 52.5200, 13.4050, 1500, 480
//!
//! [capture]
//! timeout_ms = 100
//! unavailable_after = 3
//!
//! [fps]
//! floor = 5
//! max = 60
//!
//! [matcher]
//! scales = 0.5, 1.0
//! level_confidence = 0.9, 0.8
//! feature_confidence = 0.7
//! motion_confidence = 0.5
//! max_frames_since_anchor = 30
//! lost_after = 3
//!
//! [features]
//! fast_threshold = 20
//!
//! [motion]
//! downscale = 0.25
//!
//! [markers]
//! chest-17 = 48.85, 2.35
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::capture::CaptureConfig;
use crate::coord::{CalibrationPoint, CalibrationSet};
use crate::error::SetupError;
use crate::features::FeatureConfig;
use crate::fps::FpsConfig;
use crate::matcher::{MatcherConfig, ScaleLevel};
use crate::imaging::PreprocessConfig;
use crate::motion::MotionConfig;
use crate::pipeline::Marker;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value for [{section}] {key}: {value}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `[map]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    /// Reference raster path.
    pub path: Option<PathBuf>,
    /// Detection pixels per native map pixel (default: 1.0).
    pub detection_scale: f64,
    pub preprocess: PreprocessConfig,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            path: None,
            detection_scale: 1.0,
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// Parsed configuration for every component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub map: MapSettings,
    pub calibration: Vec<CalibrationPoint>,
    pub capture: CaptureConfig,
    pub fps: FpsConfig,
    pub matcher: MatcherConfig,
    pub features: FeatureConfig,
    pub motion: MotionConfig,
    pub markers: Vec<Marker>,
}

impl ConfigFile {
    /// Read and parse a configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text)?;
        tracing::debug!(
            path = %path.display(),
            calibration_points = config.calibration.len(),
            markers = config.markers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();

        let map = Section::new(ini, "map");
        config.map.path = map.raw("path").map(PathBuf::from);
        config.map.detection_scale = map.get("detection_scale", config.map.detection_scale)?;
        config.map.preprocess.posterize_levels = map.get("posterize", 0u8)?;
        config.map.preprocess.equalize_clip_limit = map.get("equalize_clip", 0.0f32)?;
        config.map.preprocess.equalize_tiles =
            map.get("equalize_tiles", config.map.preprocess.equalize_tiles)?;
        let equalize_clip = config.map.preprocess.equalize_clip_limit;
        if !(equalize_clip.is_finite() && equalize_clip >= 0.0) {
            return Err(map.invalid("equalize_clip", equalize_clip));
        }
        if config.map.preprocess.equalize_tiles == 0 {
            return Err(map.invalid("equalize_tiles", 0));
        }
        if !(config.map.detection_scale.is_finite() && config.map.detection_scale > 0.0) {
            return Err(map.invalid("detection_scale", config.map.detection_scale));
        }

        let calibration = Section::new(ini, "calibration");
        for (key, value) in calibration.entries() {
            if let Some(point) = parse_numbers::<4>(value) {
                config.calibration.push(CalibrationPoint::new(point[0], point[1], point[2], point[3]));
            } else {
                return Err(calibration.invalid(key, value));
            }
        }

        config.capture = parse_capture(&Section::new(ini, "capture"))?;
        config.fps = parse_fps(&Section::new(ini, "fps"))?;
        config.matcher = parse_matcher(&Section::new(ini, "matcher"))?;
        config.features = parse_features(&Section::new(ini, "features"))?;
        config.motion = parse_motion(&Section::new(ini, "motion"))?;

        let markers = Section::new(ini, "markers");
        for (key, value) in markers.entries() {
            match parse_numbers::<2>(value) {
                Some([lat, lng]) => config.markers.push(Marker::new(key, lat, lng)),
                None => return Err(markers.invalid(key, value)),
            }
        }

        Ok(config)
    }

    /// Validated calibration set.
    pub fn calibration_set(&self) -> Result<CalibrationSet, SetupError> {
        CalibrationSet::new(self.calibration.clone())
    }
}

fn parse_capture(section: &Section<'_>) -> Result<CaptureConfig, ConfigError> {
    let defaults = CaptureConfig::default();
    let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
        section
            .get(key, default.as_millis() as u64)
            .map(Duration::from_millis)
    };
    let config = CaptureConfig {
        capture_timeout: millis("timeout_ms", defaults.capture_timeout)?,
        unavailable_after: section.get("unavailable_after", defaults.unavailable_after)?,
        initial_backoff: millis("initial_backoff_ms", defaults.initial_backoff)?,
        max_backoff: millis("max_backoff_ms", defaults.max_backoff)?,
    };
    if config.capture_timeout.is_zero() {
        return Err(section.invalid("timeout_ms", 0));
    }
    Ok(config)
}

fn parse_fps(section: &Section<'_>) -> Result<FpsConfig, ConfigError> {
    let d = FpsConfig::default();
    let floor_fps: f64 = section.get("floor", d.floor_fps)?;
    let config = FpsConfig {
        floor_fps,
        initial_fps: section.get("initial", floor_fps)?,
        max_fps: section.get_opt("max")?,
        adaptation_interval: section.get("adaptation_interval", d.adaptation_interval)?,
        window_size: section.get("window", d.window_size)?,
        min_samples: section.get("min_samples", d.min_samples)?,
        percentile: section.get("percentile", d.percentile)?,
        low_utilization: section.get("low_utilization", d.low_utilization)?,
        high_utilization: section.get("high_utilization", d.high_utilization)?,
        increase_factor: section.get("increase_factor", d.increase_factor)?,
        decrease_factor: section.get("decrease_factor", d.decrease_factor)?,
    };

    if !(config.floor_fps.is_finite() && config.floor_fps > 0.0) {
        return Err(section.invalid("floor", config.floor_fps));
    }
    if config.max_fps.is_some_and(|max| max < config.floor_fps) {
        return Err(section.invalid("max", config.max_fps.unwrap_or_default()));
    }
    if !(0.0..=1.0).contains(&config.percentile) {
        return Err(section.invalid("percentile", config.percentile));
    }
    if config.low_utilization >= config.high_utilization {
        return Err(section.invalid("low_utilization", config.low_utilization));
    }
    if config.increase_factor <= 1.0 {
        return Err(section.invalid("increase_factor", config.increase_factor));
    }
    if !(config.decrease_factor > 0.0 && config.decrease_factor < 1.0) {
        return Err(section.invalid("decrease_factor", config.decrease_factor));
    }
    Ok(config)
}

fn parse_matcher(section: &Section<'_>) -> Result<MatcherConfig, ConfigError> {
    let d = MatcherConfig::default();
    let mut config = MatcherConfig {
        feature_confidence: section.get("feature_confidence", d.feature_confidence)?,
        min_inliers: section.get("min_inliers", d.min_inliers)?,
        motion_confidence: section.get("motion_confidence", d.motion_confidence)?,
        max_frames_since_anchor: section.get("max_frames_since_anchor", d.max_frames_since_anchor)?,
        lost_after: section.get("lost_after", d.lost_after)?,
        early_exit_confidence: section.get("early_exit_confidence", d.early_exit_confidence)?,
        roi_expansion: section.get("roi_expansion", d.roi_expansion)?,
        levels: d.levels,
    };

    if let Some(scales) = section.raw("scales") {
        let parsed: Option<Vec<f64>> = scales
            .split(',')
            .map(|s| s.trim().parse::<f64>().ok().filter(|v| *v > 0.0 && *v <= 4.0))
            .collect();
        match parsed {
            Some(scales) if !scales.is_empty() => {
                config.levels = scales
                    .into_iter()
                    .map(|scale| {
                        let (max_features, min_matches, min_confidence) = level_budget(scale);
                        let level =
                            ScaleLevel::new(format!("{}x", scale), scale, max_features, min_matches);
                        match min_confidence {
                            Some(confidence) => level.with_min_confidence(confidence),
                            None => level,
                        }
                    })
                    .collect();
            }
            _ => return Err(section.invalid("scales", scales)),
        }
    }
    if let Some(max_features) = section.get_opt::<usize>("max_features")? {
        config.levels.iter_mut().for_each(|l| l.max_features = max_features);
    }
    if let Some(min_matches) = section.get_opt::<usize>("min_matches")? {
        config.levels.iter_mut().for_each(|l| l.min_matches = min_matches);
    }
    if let Some(confidences) = section.raw("level_confidence") {
        let parsed: Option<Vec<f64>> = confidences
            .split(',')
            .map(|s| s.trim().parse::<f64>().ok().filter(|v| (0.0..=1.0).contains(v)))
            .collect();
        match parsed {
            Some(values) if values.len() == config.levels.len() => {
                for (level, confidence) in config.levels.iter_mut().zip(values) {
                    level.min_confidence = Some(confidence);
                }
            }
            _ => return Err(section.invalid("level_confidence", confidences)),
        }
    }

    for (key, value) in [
        ("feature_confidence", config.feature_confidence),
        ("motion_confidence", config.motion_confidence),
        ("early_exit_confidence", config.early_exit_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(section.invalid(key, value));
        }
    }
    if config.roi_expansion < 1.0 {
        return Err(section.invalid("roi_expansion", config.roi_expansion));
    }
    if config.lost_after == 0 {
        return Err(section.invalid("lost_after", 0));
    }
    Ok(config)
}

/// Feature budget, match minimum and exit threshold for a level at `scale`.
fn level_budget(scale: f64) -> (usize, usize, Option<f64>) {
    if scale < 0.75 {
        (300, 8, Some(0.9))
    } else {
        (500, 10, None)
    }
}

fn parse_features(section: &Section<'_>) -> Result<FeatureConfig, ConfigError> {
    let d = FeatureConfig::default();
    let mut config = FeatureConfig {
        fast_threshold: section.get("fast_threshold", d.fast_threshold)?,
        border: section.get("border", d.border)?,
        max_map_features: section.get("max_map_features", d.max_map_features)?,
        blur_sigma: section.get("blur_sigma", d.blur_sigma)?,
        ratio: section.get("ratio", d.ratio)?,
        max_hamming: section.get("max_hamming", d.max_hamming)?,
        saturation_inliers: section.get("saturation_inliers", d.saturation_inliers)?,
        index_cell_size: section.get("index_cell_size", d.index_cell_size)?,
        ransac: d.ransac.clone(),
    };
    config.ransac.iterations = section.get("ransac_iterations", d.ransac.iterations)?;
    config.ransac.inlier_threshold = section.get("ransac_threshold", d.ransac.inlier_threshold)?;
    config.ransac.seed = section.get("ransac_seed", d.ransac.seed)?;

    if config.border < 20 {
        return Err(section.invalid("border", config.border));
    }
    if !(config.ratio > 0.0 && config.ratio <= 1.0) {
        return Err(section.invalid("ratio", config.ratio));
    }
    Ok(config)
}

fn parse_motion(section: &Section<'_>) -> Result<MotionConfig, ConfigError> {
    let d = MotionConfig::default();
    let config = MotionConfig {
        downscale: section.get("downscale", d.downscale)?,
        min_texture_stddev: section.get("min_texture_stddev", d.min_texture_stddev)?,
        psr_floor: section.get("psr_floor", d.psr_floor)?,
        psr_ceiling: section.get("psr_ceiling", d.psr_ceiling)?,
        sidelobe_exclusion: section.get("sidelobe_exclusion", d.sidelobe_exclusion)?,
        apply_window: section.get("apply_window", d.apply_window)?,
    };
    if !(config.downscale > 0.0 && config.downscale <= 1.0) {
        return Err(section.invalid("downscale", config.downscale));
    }
    if config.psr_ceiling <= config.psr_floor {
        return Err(section.invalid("psr_ceiling", config.psr_ceiling));
    }
    Ok(config)
}

/// Comma-separated list of exactly `N` finite numbers.
fn parse_numbers<const N: usize>(value: &str) -> Option<[f64; N]> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    parts.try_into().ok()
}

/// Typed accessor over one INI section.
struct Section<'a> {
    name: &'static str,
    props: Option<&'a Properties>,
}

impl<'a> Section<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Self {
        Self {
            name,
            props: ini.section(Some(name)),
        }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.props
            .and_then(|p| p.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn entries(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.props.into_iter().flat_map(|p| p.iter())
    }

    fn get_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.raw(key) {
            None => Ok(None),
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| self.invalid(key, value)),
        }
    }

    fn get<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get_opt(key)?.unwrap_or(default))
    }

    fn invalid(&self, key: &str, value: impl ToString) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
