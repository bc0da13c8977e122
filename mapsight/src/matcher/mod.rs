//! Absolute and incremental position matching.
//!
//! [`CascadeScaleMatcher`] anchors a frame on the reference map with a
//! multi-scale feature search, then follows it with cheap phase-correlation
//! updates until the anchor needs refreshing.
//!
//! ```text
//!             ┌──────────── full match (whole map) ────────────┐
//!  frame ─►  COLD                                           ANCHORED
//!             ▲                                               │ motion ok
//!             │ next step                                     ▼
//!            LOST ◄── k failures / featureless ──────────  TRACKING
//!                                                   │ N_max or low motion
//!                                                   └► full match (last viewport × 1.5)
//! ```

mod cascade;
mod config;
mod result;
mod search;
mod state;

pub use cascade::CascadeScaleMatcher;
pub use config::{
    default_levels, MatcherConfig, ScaleLevel, DEFAULT_FEATURE_CONFIDENCE, DEFAULT_LOST_AFTER,
    DEFAULT_MAX_FRAMES_SINCE_ANCHOR, DEFAULT_MOTION_CONFIDENCE,
};
pub use result::{MatchResult, Viewport};
pub use search::{FeatureMatcher, LevelMatch, LevelMatcher};
pub use state::{MatchMode, TrackerState};
