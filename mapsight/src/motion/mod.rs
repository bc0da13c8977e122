//! Motion-only tracking.
//!
//! Estimates the translation between two grayscale frames with phase
//! correlation. This is the cheap per-tick path of the tracker; full feature
//! matching is only used to establish or refresh an absolute anchor.
//!
//! Inputs are [`image::GrayImage`]: colour frames must go through
//! [`crate::capture::Frame::to_gray`] first. Correlating raw colour buffers
//! would produce near-zero confidence for all real content.

mod fft;
mod tracker;

pub use tracker::{MotionConfig, MotionEstimate, MotionFrame, MotionTracker};
