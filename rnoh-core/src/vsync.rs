//! Frame boundary signals.
//!
//! A [`VsyncSource`] delivers one [`FrameTick`] per request. Subscribers that
//! want the next frame as well request again from inside their callback.
//! Callbacks may arrive on any thread; consumers hop to their own lane.

use std::time::{Duration, Instant};

/// A frame opportunity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTick {
    /// Time the frame started.
    pub timestamp: Instant,
    /// Display refresh period.
    pub period: Duration,
    /// Monotonically increasing frame counter.
    pub frame_index: u64,
}

impl FrameTick {
    /// Time left in the frame at `now`, or zero once the frame is over.
    pub fn remaining_at(&self, now: Instant, frame_duration: Duration) -> Duration {
        frame_duration.saturating_sub(now.saturating_duration_since(self.timestamp))
    }
}

/// Callback invoked with the next frame tick.
pub type FrameCallback = Box<dyn FnOnce(FrameTick) + Send + 'static>;

/// Source of frame ticks.
pub trait VsyncSource: Send + Sync {
    /// Invokes `callback` once, at the next frame.
    fn request_frame(&self, callback: FrameCallback);
}
