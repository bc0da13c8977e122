//! The consumer side: turning captured frames into published positions.
//!
//! [`Pipeline`] is the synchronous tick (frame → matcher → transform →
//! markers → FPS feedback). [`PositionService`] runs it on its own thread
//! next to the capture service and publishes [`PositionFix`] values.

mod markers;
mod processor;
mod service;

pub use markers::{Marker, MarkerSet, ProjectedMarker};
pub use processor::{Pipeline, PositionFix, TickOutcome};
pub use service::PositionService;
