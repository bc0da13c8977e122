//! Pipeline telemetry for observability.
//!
//! Counters are lock-free atomics written by the processing thread; latency
//! uses a small bounded window. Readers take a [`TelemetrySnapshot`].
//!
//! ```text
//! processing tick ──► PipelineMetrics ──┐
//!                 ──► LatencyWindow ────┼──► TelemetrySnapshot ──► CLI / UI (JSON)
//! FPS controller, capture, tracker ─────┘
//! ```

mod latency;
mod metrics;
mod snapshot;

pub use latency::{LatencyStats, LatencyWindow, DEFAULT_LATENCY_WINDOW};
pub use metrics::{PipelineCounters, PipelineMetrics};
pub use snapshot::TelemetrySnapshot;
