//! Lock-free pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::matcher::{MatchMode, MatchResult, TrackerState};

/// Counters updated by the processing thread and read by observers.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    anchors: AtomicU64,
    tracked_updates: AtomicU64,
    failed_steps: AtomicU64,
    lost_events: AtomicU64,
    fixes_published: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    pub frames_processed: u64,
    /// Frames overwritten in the slot before the processor saw them.
    pub frames_dropped: u64,
    pub anchors: u64,
    pub tracked_updates: u64,
    pub failed_steps: u64,
    pub lost_events: u64,
    pub fixes_published: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` frames skipped by the consumer.
    pub fn frames_dropped(&self, count: u64) {
        if count > 0 {
            self.frames_dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Record the outcome of one matcher step.
    pub fn step_completed(&self, result: &MatchResult, previous_state: TrackerState) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        match (result.is_accepted(), result.mode) {
            (true, MatchMode::Anchored) => self.anchors.fetch_add(1, Ordering::Relaxed),
            (true, MatchMode::Tracked) => self.tracked_updates.fetch_add(1, Ordering::Relaxed),
            (false, _) => self.failed_steps.fetch_add(1, Ordering::Relaxed),
        };
        if result.state == TrackerState::Lost && previous_state != TrackerState::Lost {
            self.lost_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn fix_published(&self) {
        self.fixes_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            anchors: self.anchors.load(Ordering::Relaxed),
            tracked_updates: self.tracked_updates.load(Ordering::Relaxed),
            failed_steps: self.failed_steps.load(Ordering::Relaxed),
            lost_events: self.lost_events.load(Ordering::Relaxed),
            fixes_published: self.fixes_published.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::DetectionPoint;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn result(state: TrackerState, mode: MatchMode, accepted: bool) -> MatchResult {
        MatchResult {
            frame_sequence: 1,
            state,
            mode,
            position: accepted.then(|| DetectionPoint::new(1.0, 2.0)),
            viewport: None,
            confidence: if accepted { 0.9 } else { 0.0 },
            scale: 1.0,
            matched_features: None,
            inliers: 0,
            timestamp: Instant::now(),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_step_counters() {
        let metrics = PipelineMetrics::new();
        metrics.step_completed(
            &result(TrackerState::Anchored, MatchMode::Anchored, true),
            TrackerState::Cold,
        );
        metrics.step_completed(
            &result(TrackerState::Tracking, MatchMode::Tracked, true),
            TrackerState::Anchored,
        );
        metrics.step_completed(
            &result(TrackerState::Lost, MatchMode::Tracked, false),
            TrackerState::Tracking,
        );
        metrics.frames_dropped(0);
        metrics.frames_dropped(4);

        let c = metrics.counters();
        assert_eq!(c.frames_processed, 3);
        assert_eq!(c.anchors, 1);
        assert_eq!(c.tracked_updates, 1);
        assert_eq!(c.failed_steps, 1);
        assert_eq!(c.lost_events, 1);
        assert_eq!(c.frames_dropped, 4);
    }

    #[test]
    fn test_thread_safe_counting() {
        let metrics = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.fix_published();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.counters().fixes_published, 800);
    }
}
