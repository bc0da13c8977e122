//! Background frame capture.
//!
//! The capture side of the pipeline is a single producer thread that pulls
//! frames from a [`CaptureSource`] and overwrites a single-slot
//! [`FrameSlot`]. Consumers always see the freshest frame; frames they did not
//! get to are dropped, never queued.
//!
//! ```text
//! CaptureSource ──► ContinuousCaptureService ──► FrameSlot ──► consumer
//!                         ▲ (capture thread)      (latest)
//!                         │
//!                    RateHandle (target FPS from the controller)
//! ```

mod frame;
mod service;
mod signal;
mod slot;
mod source;

pub use frame::{Frame, PixelLayout};
pub use service::{
    CaptureConfig, CaptureSnapshot, CaptureStatus, ContinuousCaptureService,
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_UNAVAILABLE_AFTER,
};
pub use signal::ShutdownSignal;
pub use slot::FrameSlot;
pub use source::{CaptureSource, FnSource, ImageSequenceSource};

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by capture sources.
///
/// None of these are fatal: the capture service retries with backoff and
/// surfaces persistent failure as [`CaptureStatus::Unavailable`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The window or surface to capture does not exist.
    #[error("Capture target not found")]
    WindowNotFound,

    /// The capture surface went away mid-session.
    #[error("Capture surface lost: {0}")]
    SurfaceLost(String),

    /// The source produced a malformed pixel buffer.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// I/O error while reading frames.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame file could not be decoded.
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}
