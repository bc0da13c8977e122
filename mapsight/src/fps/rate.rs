//! Lock-free target rate cell shared between controller and capture loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to the current target frame rate.
///
/// The FPS controller is the only writer; the capture loop reads it on every
/// iteration. Stored as `f64` bits in an `AtomicU64`.
#[derive(Debug, Clone)]
pub struct RateHandle {
    bits: Arc<AtomicU64>,
}

impl RateHandle {
    pub fn new(fps: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(fps.to_bits())),
        }
    }

    /// Current target in frames per second.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, fps: f64) {
        self.bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    /// Frame interval implied by the current target.
    ///
    /// Non-positive or non-finite rates map to one second.
    pub fn interval(&self) -> Duration {
        let fps = self.get();
        if fps.is_finite() && fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::from_secs(1)
        }
    }
}
