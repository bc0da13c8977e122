//! Adaptive capture/processing rate.
//!
//! The controller observes how long each processing tick takes and steers
//! the capture rate so that processing uses a healthy share of each frame
//! interval.
//!
//! ```text
//!  processing loop ──duration──► AdaptiveFpsController ──► RateHandle ──► capture loop
//!                                 (window + next_rate)      (atomic f64)   (sleep 1/fps)
//! ```

mod controller;
mod policy;
mod rate;

pub use controller::{AdaptiveFpsController, FpsSnapshot};
pub use policy::{
    next_rate, percentile, FpsConfig, RateAdjustment, RateDecision, DEFAULT_FLOOR_FPS,
};
pub use rate::RateHandle;
