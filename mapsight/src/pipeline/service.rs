//! Capture + processing threads with a latest-value output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

use super::processor::{Pipeline, PositionFix};
use crate::capture::{CaptureConfig, CaptureSource, ContinuousCaptureService, FrameSlot};
use crate::error::SetupError;
use crate::fps::FpsSnapshot;
use crate::matcher::TrackerState;
use crate::telemetry::{LatencyWindow, PipelineMetrics, TelemetrySnapshot};

/// How long the processor waits for a frame before re-checking shutdown.
const PROCESS_POLL: Duration = Duration::from_millis(100);

/// State the processing thread exposes to readers.
#[derive(Debug)]
struct ProcessorShared {
    tracker_state: Mutex<TrackerState>,
    fps: Mutex<FpsSnapshot>,
    last_confidence: Mutex<f64>,
    last_sequence: AtomicU64,
}

/// Running position tracker.
///
/// ```text
///   capture thread ──► FrameSlot ──► processing thread ──► watch<Option<PositionFix>>
///        ▲                                │
///        └────────── RateHandle ◄─────────┘ (FPS controller)
/// ```
///
/// The watch channel only changes on accepted ticks, so subscribers keep the
/// last good position through failures and LOST.
///
/// # Example
///
/// ```ignore
/// let service = PositionService::start(pipeline, CaptureConfig::default(), source)?;
/// let mut fixes = service.subscribe();
/// if let Some(fix) = fixes.borrow_and_update().as_ref() {
///     draw_markers(&fix.markers);
/// }
/// service.stop();
/// ```
pub struct PositionService {
    capture: ContinuousCaptureService,
    slot: Arc<FrameSlot>,
    shared: Arc<ProcessorShared>,
    metrics: Arc<PipelineMetrics>,
    latency: Arc<LatencyWindow>,
    fixes: watch::Receiver<Option<PositionFix>>,
    processor: Option<JoinHandle<()>>,
    started: Instant,
}

impl std::fmt::Debug for PositionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionService")
            .field("capture", &self.capture)
            .field("tracker_state", &*self.shared.tracker_state.lock())
            .field("running", &self.processor.is_some())
            .finish_non_exhaustive()
    }
}

impl PositionService {
    /// Spawn the processing and capture threads.
    pub fn start<S>(pipeline: Pipeline, capture: CaptureConfig, source: S) -> Result<Self, SetupError>
    where
        S: CaptureSource + 'static,
    {
        let mut capture = ContinuousCaptureService::new(capture, pipeline.rate_handle());
        let slot = capture.slot();
        let metrics = pipeline.metrics();
        let latency = pipeline.latency();
        let shared = Arc::new(ProcessorShared {
            tracker_state: Mutex::new(pipeline.state()),
            fps: Mutex::new(pipeline.fps_snapshot()),
            last_confidence: Mutex::new(0.0),
            last_sequence: AtomicU64::new(0),
        });
        let (sender, fixes) = watch::channel(None);

        let processor = {
            let slot = Arc::clone(&slot);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("mapsight-process".to_string())
                .spawn(move || process_loop(pipeline, slot, shared, sender))
                .map_err(|source| SetupError::Spawn {
                    name: "processing",
                    source,
                })?
        };

        if let Err(e) = capture.start(source) {
            slot.close();
            if processor.join().is_err() {
                tracing::error!("Processing thread panicked");
            }
            return Err(e);
        }

        tracing::info!("Position service started");
        Ok(Self {
            capture,
            slot,
            shared,
            metrics,
            latency,
            fixes,
            processor: Some(processor),
            started: Instant::now(),
        })
    }

    /// Receiver for the most recent accepted fix.
    pub fn subscribe(&self) -> watch::Receiver<Option<PositionFix>> {
        self.fixes.clone()
    }

    /// Most recent accepted fix.
    pub fn latest_fix(&self) -> Option<PositionFix> {
        self.fixes.borrow().clone()
    }

    pub fn tracker_state(&self) -> TrackerState {
        *self.shared.tracker_state.lock()
    }

    /// Sequence number of the last processed frame (0 before the first).
    pub fn last_processed_sequence(&self) -> u64 {
        self.shared.last_sequence.load(Ordering::Acquire)
    }

    /// Sequence number of the last captured frame.
    pub fn last_captured_sequence(&self) -> u64 {
        self.slot.latest_sequence()
    }

    pub fn is_running(&self) -> bool {
        self.processor.is_some()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime_secs: self.started.elapsed().as_secs_f64(),
            tracker_state: self.tracker_state(),
            last_confidence: *self.shared.last_confidence.lock(),
            fps: *self.shared.fps.lock(),
            latency: self.latency.stats(),
            counters: self.metrics.counters(),
            capture: self.capture.snapshot(),
        }
    }

    /// Stop both threads.
    ///
    /// On return the capture source has been dropped and no thread is left
    /// running. The last fix stays readable.
    pub fn stop(&mut self) {
        self.capture.stop();
        self.slot.close();
        if let Some(handle) = self.processor.take() {
            if handle.join().is_err() {
                tracing::error!("Processing thread panicked");
            }
            tracing::info!(
                frames = self.metrics.counters().frames_processed,
                "Position service stopped"
            );
        }
    }
}

impl Drop for PositionService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_loop(
    mut pipeline: Pipeline,
    slot: Arc<FrameSlot>,
    shared: Arc<ProcessorShared>,
    sender: watch::Sender<Option<PositionFix>>,
) {
    let metrics = pipeline.metrics();
    let mut last_sequence = 0u64;

    while !slot.is_closed() {
        let Some(frame) = slot.wait_newer(last_sequence, PROCESS_POLL) else {
            continue;
        };
        let sequence = frame.sequence();
        metrics.frames_dropped(sequence.saturating_sub(last_sequence + 1));
        last_sequence = sequence;

        let outcome = pipeline.tick(&frame);
        drop(frame);

        *shared.tracker_state.lock() = outcome.result.state;
        *shared.fps.lock() = pipeline.fps_snapshot();
        *shared.last_confidence.lock() = outcome.result.confidence;

        if let Some(fix) = outcome.fix {
            sender.send_replace(Some(fix));
            metrics.fix_published();
        }
        shared.last_sequence.store(sequence, Ordering::Release);
    }

    tracing::debug!(last_sequence, "Processing loop stopped");
}
