//! Serializable view of the whole pipeline.

use serde::Serialize;

use super::{LatencyStats, PipelineCounters};
use crate::capture::CaptureSnapshot;
use crate::fps::FpsSnapshot;
use crate::matcher::TrackerState;

/// Read-only snapshot for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub uptime_secs: f64,
    pub tracker_state: TrackerState,
    /// Confidence of the most recent step (0 on failure).
    pub last_confidence: f64,
    pub fps: FpsSnapshot,
    pub latency: LatencyStats,
    pub counters: PipelineCounters,
    pub capture: CaptureSnapshot,
}

impl TelemetrySnapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Share of processed frames that produced a position.
    pub fn acceptance_rate(&self) -> f64 {
        let processed = self.counters.frames_processed;
        if processed == 0 {
            return 0.0;
        }
        (self.counters.anchors + self.counters.tracked_updates) as f64 / processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureStatus;
    use crate::fps::AdaptiveFpsController;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime_secs: 1.5,
            tracker_state: TrackerState::Tracking,
            last_confidence: 0.8,
            fps: AdaptiveFpsController::with_defaults().snapshot(),
            latency: LatencyStats::default(),
            counters: PipelineCounters {
                frames_processed: 10,
                anchors: 2,
                tracked_updates: 6,
                ..Default::default()
            },
            capture: CaptureSnapshot {
                status: CaptureStatus::Unavailable {
                    consecutive_failures: 4,
                },
                frames_captured: 12,
                empty_polls: 0,
                failures_total: 4,
            },
        }
    }

    #[test]
    fn test_to_json() {
        let json = snapshot().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tracker_state"], "TRACKING");
        assert_eq!(value["fps"]["target_fps"], 5.0);
        assert_eq!(value["capture"]["status"]["state"], "unavailable");
        assert_eq!(value["capture"]["status"]["consecutive_failures"], 4);
        assert_eq!(value["counters"]["anchors"], 2);
    }

    #[test]
    fn test_acceptance_rate() {
        assert!((snapshot().acceptance_rate() - 0.8).abs() < 1e-12);
    }
}
