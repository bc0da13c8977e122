//! Rolling end-to-end latency statistics.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::fps::percentile;

/// Number of recent ticks summarised.
pub const DEFAULT_LATENCY_WINDOW: usize = 120;

/// Summary of the latency window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Bounded window of per-tick latencies.
#[derive(Debug)]
pub struct LatencyWindow {
    capacity: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_WINDOW)
    }
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, latency: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1000.0);
    }

    pub fn stats(&self) -> LatencyStats {
        let samples: Vec<f64> = self.samples.lock().iter().copied().collect();
        if samples.is_empty() {
            return LatencyStats::default();
        }
        LatencyStats {
            samples: samples.len(),
            mean_ms: samples.iter().sum::<f64>() / samples.len() as f64,
            p50_ms: percentile(&samples, 0.5).unwrap_or_default(),
            p95_ms: percentile(&samples, 0.95).unwrap_or_default(),
            max_ms: samples.iter().copied().fold(0.0, f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        assert_eq!(LatencyWindow::default().stats(), LatencyStats::default());
    }

    #[test]
    fn test_stats() {
        let window = LatencyWindow::new(120);
        for ms in 1..=100u64 {
            window.record(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert_eq!(stats.samples, 100);
        assert!((stats.mean_ms - 50.5).abs() < 1e-9);
        assert!((stats.p50_ms - 50.5).abs() < 1e-9);
        assert!((stats.p95_ms - 95.05).abs() < 1e-9);
        assert!((stats.max_ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded() {
        let window = LatencyWindow::new(10);
        for ms in 0..50u64 {
            window.record(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert_eq!(stats.samples, 10);
        // Only 40..=49 remain
        assert!((stats.mean_ms - 44.5).abs() < 1e-9);
    }
}
