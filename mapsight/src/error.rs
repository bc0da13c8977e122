//! Startup error types.
//!
//! Only configuration problems detected before capture begins are fatal.
//! Everything that can happen while the pipeline is running (capture
//! hiccups, low-confidence matches, featureless frames) is reported through
//! status values and confidence scores instead of errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal errors raised while assembling the tracking pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    /// No calibration control points were supplied.
    #[error("Calibration missing: at least 3 control points are required")]
    CalibrationMissing,

    /// Control points were supplied but cannot produce an affine transform.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// The reference map raster could not be read.
    #[error("Reference map missing at {path}: {reason}")]
    ReferenceMapMissing { path: PathBuf, reason: String },

    /// The reference map raster has no pixels.
    #[error("Reference map is empty")]
    EmptyReferenceMap,

    /// The reference map detection scale is not a positive finite number.
    #[error("Invalid detection scale: {0}")]
    InvalidDetectionScale(f64),

    /// Configuration file problem.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A worker thread could not be started.
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
