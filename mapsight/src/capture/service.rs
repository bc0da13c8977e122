//! Continuous background capture.
//!
//! # Loop
//!
//! ```text
//!          ┌───────────────────────────────────────────────┐
//!          ▼                                               │
//!   capture(timeout) ──Ok(frame)──► slot.publish ──► sleep(1 / target_fps)
//!          │                                               ▲
//!          └──Err──► backoff(n) ───────────────────────────┘
//!                    (Unavailable after `unavailable_after` consecutive errors)
//! ```
//!
//! The sleep interval is read from the shared [`RateHandle`] on every
//! iteration, so FPS controller changes apply to the very next capture. All
//! sleeps are interruptible by [`ContinuousCaptureService::stop`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use super::{CaptureSource, Frame, FrameSlot, ShutdownSignal};
use crate::error::SetupError;
use crate::fps::RateHandle;

/// Default bound on a single capture call.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(100);

/// Default number of consecutive failures before reporting unavailability.
pub const DEFAULT_UNAVAILABLE_AFTER: u32 = 3;

/// Configuration for the capture loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Maximum wait for the capture surface per call (default: 100ms).
    pub capture_timeout: Duration,
    /// Consecutive failures before the status becomes `Unavailable` (default: 3).
    pub unavailable_after: u32,
    /// Backoff after the first failure; doubles per further failure (default: 50ms).
    pub initial_backoff: Duration,
    /// Upper bound on the backoff delay (default: 1s).
    pub max_backoff: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            unavailable_after: DEFAULT_UNAVAILABLE_AFTER,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl CaptureConfig {
    /// Delay before the next attempt after `failures` consecutive errors.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Capture service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaptureStatus {
    /// Not started yet.
    Idle,
    /// Thread running, no frame captured yet.
    Starting,
    /// Frames are being captured.
    Running,
    /// Capture has failed repeatedly; still retrying.
    Unavailable { consecutive_failures: u32 },
    /// Loop exited and the source was released.
    Stopped,
}

impl CaptureStatus {
    /// User-facing status text.
    pub fn display_status(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "Idle",
            CaptureStatus::Starting => "Starting...",
            CaptureStatus::Running => "Capturing",
            CaptureStatus::Unavailable { .. } => "Unavailable",
            CaptureStatus::Stopped => "Stopped",
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CaptureStatus::Unavailable { .. })
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Unavailable {
                consecutive_failures,
            } => write!(f, "unavailable ({} failures)", consecutive_failures),
            other => f.write_str(&other.display_status().to_lowercase()),
        }
    }
}

/// Point-in-time view of the capture service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptureSnapshot {
    pub status: CaptureStatus,
    pub frames_captured: u64,
    pub empty_polls: u64,
    pub failures_total: u64,
}

#[derive(Debug)]
struct CaptureShared {
    status: Mutex<CaptureStatus>,
    frames_captured: AtomicU64,
    empty_polls: AtomicU64,
    failures_total: AtomicU64,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            status: Mutex::new(CaptureStatus::Idle),
            frames_captured: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            failures_total: AtomicU64::new(0),
        }
    }

    fn set_status(&self, status: CaptureStatus) {
        *self.status.lock() = status;
    }
}

/// Background producer that keeps the latest screen frame in a [`FrameSlot`].
///
/// # Example
///
/// ```ignore
/// let rate = RateHandle::new(5.0);
/// let mut capture = ContinuousCaptureService::new(CaptureConfig::default(), rate);
/// capture.start(ImageSequenceSource::open(dir, true)?)?;
///
/// if let Some(frame) = capture.latest_frame() {
///     // process frame
/// }
///
/// capture.stop(); // thread joined, source dropped
/// ```
pub struct ContinuousCaptureService {
    config: CaptureConfig,
    slot: Arc<FrameSlot>,
    rate: RateHandle,
    shared: Arc<CaptureShared>,
    shutdown: ShutdownSignal,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for ContinuousCaptureService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousCaptureService")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ContinuousCaptureService {
    /// Create a stopped service with its own slot.
    pub fn new(config: CaptureConfig, rate: RateHandle) -> Self {
        Self::with_slot(config, rate, Arc::new(FrameSlot::new()))
    }

    /// Create a stopped service publishing into an existing slot.
    pub fn with_slot(config: CaptureConfig, rate: RateHandle, slot: Arc<FrameSlot>) -> Self {
        Self {
            config,
            slot,
            rate,
            shared: Arc::new(CaptureShared::new()),
            shutdown: ShutdownSignal::new(),
            handle: None,
        }
    }

    /// Spawn the capture thread.
    ///
    /// Calling `start` on a running service is a no-op.
    pub fn start<S>(&mut self, source: S) -> Result<(), SetupError>
    where
        S: CaptureSource + 'static,
    {
        if self.handle.is_some() {
            tracing::warn!("Capture service already running");
            return Ok(());
        }

        self.shutdown = ShutdownSignal::new();
        self.shared.set_status(CaptureStatus::Starting);

        let worker = CaptureWorker {
            config: self.config.clone(),
            slot: Arc::clone(&self.slot),
            rate: self.rate.clone(),
            shared: Arc::clone(&self.shared),
            shutdown: self.shutdown.clone(),
        };

        let handle = thread::Builder::new()
            .name("mapsight-capture".to_string())
            .spawn(move || worker.run(source))
            .map_err(|source| SetupError::Spawn {
                name: "capture",
                source,
            })?;
        self.handle = Some(handle);

        tracing::info!(
            target_fps = format!("{:.1}", self.rate.get()),
            timeout_ms = self.config.capture_timeout.as_millis() as u64,
            "Capture service started"
        );
        Ok(())
    }

    /// Stop the capture thread and wait for it to release its source.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shutdown.trigger();
        if handle.join().is_err() {
            tracing::error!("Capture thread panicked");
        }
        self.shared.set_status(CaptureStatus::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// The most recently captured frame, if any.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.slot.latest()
    }

    /// The slot frames are published into.
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn status(&self) -> CaptureStatus {
        *self.shared.status.lock()
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            status: self.status(),
            frames_captured: self.shared.frames_captured.load(Ordering::Relaxed),
            empty_polls: self.shared.empty_polls.load(Ordering::Relaxed),
            failures_total: self.shared.failures_total.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ContinuousCaptureService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the capture thread.
struct CaptureWorker {
    config: CaptureConfig,
    slot: Arc<FrameSlot>,
    rate: RateHandle,
    shared: Arc<CaptureShared>,
    shutdown: ShutdownSignal,
}

impl CaptureWorker {
    fn run<S: CaptureSource>(self, mut source: S) {
        let mut failures: u32 = 0;

        while !self.shutdown.is_triggered() {
            let tick_start = Instant::now();

            match source.capture(self.config.capture_timeout) {
                Ok(Some(frame)) => {
                    if failures >= self.config.unavailable_after {
                        tracing::info!(
                            source = source.name(),
                            failures,
                            "Capture recovered"
                        );
                    }
                    failures = 0;
                    self.slot.publish(frame);
                    self.shared.frames_captured.fetch_add(1, Ordering::Relaxed);
                    self.shared.set_status(CaptureStatus::Running);
                }
                Ok(None) => {
                    self.shared.empty_polls.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.shared.failures_total.fetch_add(1, Ordering::Relaxed);

                    if failures == self.config.unavailable_after {
                        tracing::warn!(
                            source = source.name(),
                            error = %e,
                            failures,
                            "Capture unavailable, retrying with backoff"
                        );
                    } else {
                        tracing::debug!(source = source.name(), error = %e, failures, "Capture failed");
                    }
                    if failures >= self.config.unavailable_after {
                        self.shared.set_status(CaptureStatus::Unavailable {
                            consecutive_failures: failures,
                        });
                    }

                    if self.shutdown.wait_timeout(self.config.backoff_for(failures)) {
                        break;
                    }
                    continue;
                }
            }

            let remaining = self.rate.interval().saturating_sub(tick_start.elapsed());
            if !remaining.is_zero() && self.shutdown.wait_timeout(remaining) {
                break;
            }
        }

        drop(source);
        tracing::info!(
            frames = self.shared.frames_captured.load(Ordering::Relaxed),
            "Capture loop stopped"
        );
    }
}
