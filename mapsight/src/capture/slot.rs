//! Single-slot latest-frame cell.
//!
//! The capture thread overwrites the slot unconditionally; consumers read the
//! newest frame or wait for one newer than what they last processed. There is
//! no queue: a consumer that falls behind skips the frames it missed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::Frame;

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<Arc<Frame>>,
    /// Sequence number of the most recent publish (0 = nothing yet).
    sequence: u64,
    closed: bool,
}

/// Latest-value cell shared between the capture producer and its consumer.
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    published: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame, stamping it with the next sequence number.
    ///
    /// Never blocks on consumers. Returns the assigned sequence number.
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut inner = self.inner.lock();
        inner.sequence += 1;
        let sequence = inner.sequence;
        inner.frame = Some(Arc::new(frame.with_sequence(sequence)));
        drop(inner);
        self.published.notify_all();
        sequence
    }

    /// The most recently published frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.inner.lock().frame.clone()
    }

    /// Sequence number of the most recent publish (0 before the first).
    pub fn latest_sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// Wait until a frame newer than `after` is available.
    ///
    /// Returns `None` on timeout or once the slot is closed.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if inner.sequence > after {
                return inner.frame.clone();
            }
            if self.published.wait_until(&mut inner, deadline).timed_out() {
                return if inner.sequence > after && !inner.closed {
                    inner.frame.clone()
                } else {
                    None
                };
            }
        }
    }

    /// Wake all waiters and make further waits return immediately.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.published.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
