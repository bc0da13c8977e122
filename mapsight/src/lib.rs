//! MapSight - real-time camera position tracking on a fixed reference map.
//!
//! Live screen captures are matched against one large reference image so
//! overlay markers can be drawn at the right screen location. The library
//! is the capture-and-match core:
//!
//! ```text
//!  CaptureSource ─► ContinuousCaptureService ─► FrameSlot (latest only)
//!                          ▲                          │
//!                    RateHandle                       ▼
//!                          │              Pipeline::tick (processing thread)
//!              AdaptiveFpsController ◄──  CascadeScaleMatcher ◄─ ReferenceMap
//!                                              │   └ MotionTracker
//!                                              ▼
//!                                   CoordinateTransform ─► PositionFix (watch)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mapsight::prelude::*;
//!
//! let config = ConfigFile::load_from(path)?;
//! let calibration = config.calibration_set()?;
//! let transform = Arc::new(CoordinateTransform::new(&calibration, config.map.detection_scale)?);
//! let map = Arc::new(ReferenceMap::load(
//!     map_path,
//!     config.map.detection_scale,
//!     &config.features,
//!     config.map.preprocess,
//! )?);
//!
//! let matcher = CascadeScaleMatcher::with_reference(config.matcher, map, config.features, config.motion);
//! let markers = MarkerSet::new(config.markers, &transform);
//! let pipeline = Pipeline::new(matcher, transform, markers, AdaptiveFpsController::new(config.fps));
//!
//! let service = PositionService::start(pipeline, config.capture, source)?;
//! ```

pub mod capture;
pub mod config;
pub mod coord;
pub mod error;
pub mod features;
pub mod fps;
pub mod imaging;
pub mod matcher;
pub mod motion;
pub mod pipeline;
pub mod reference;
pub mod telemetry;

#[cfg(test)]
mod testing;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types.
pub mod prelude {
    pub use crate::capture::{
        CaptureConfig, CaptureSource, CaptureStatus, ContinuousCaptureService, Frame,
        ImageSequenceSource, PixelLayout,
    };
    pub use crate::config::ConfigFile;
    pub use crate::coord::{CoordinateTransform, DetectionPoint, GeoPoint};
    pub use crate::error::SetupError;
    pub use crate::fps::{AdaptiveFpsController, FpsConfig};
    pub use crate::imaging::PreprocessConfig;
    pub use crate::matcher::{
        CascadeScaleMatcher, MatchMode, MatchResult, MatcherConfig, TrackerState, Viewport,
    };
    pub use crate::motion::{MotionConfig, MotionTracker};
    pub use crate::pipeline::{Marker, MarkerSet, Pipeline, PositionFix, PositionService};
    pub use crate::reference::ReferenceMap;
    pub use crate::telemetry::TelemetrySnapshot;
}
