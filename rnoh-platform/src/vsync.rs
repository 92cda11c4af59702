//! Timer-driven frame source.
//!
//! [`TimerVsync`] stands in for the display link on hosts without one. A
//! dedicated thread sleeps until someone requests a frame, waits for the next
//! period boundary and then delivers the tick to every pending callback.

use std::{
    fmt, mem,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use rnoh_core::{
    FrameTick, RnohError, RnohResult, VsyncSource, config::DEFAULT_FRAME_DURATION,
    thread_utils::set_thread_name, vsync::FrameCallback,
};
use tracing::debug;

const THREAD_NAME: &str = "RNOH_VSYNC";

struct VsyncState {
    callbacks: Vec<FrameCallback>,
    running: bool,
}

struct Shared {
    state: Mutex<VsyncState>,
    wake: Condvar,
}

/// [`VsyncSource`] that ticks on a fixed period.
pub struct TimerVsync {
    shared: Arc<Shared>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl TimerVsync {
    /// Starts a source ticking at the default frame rate.
    pub fn new() -> RnohResult<Self> {
        Self::with_period(DEFAULT_FRAME_DURATION)
    }

    /// Starts a source ticking every `period`.
    pub fn with_period(period: Duration) -> RnohResult<Self> {
        let period = period.max(Duration::from_micros(100));
        let shared = Arc::new(Shared {
            state: Mutex::new(VsyncState {
                callbacks: Vec::new(),
                running: true,
            }),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                set_thread_name(THREAD_NAME);
                run(&worker, period);
                debug!("vsync thread stopped");
            })
            .map_err(|err| {
                RnohError::TaskExecutor(format!("failed to spawn {THREAD_NAME}: {err}"))
            })?;
        Ok(Self {
            shared,
            period,
            handle: Some(handle),
        })
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl VsyncSource for TimerVsync {
    fn request_frame(&self, callback: FrameCallback) {
        self.shared.state.lock().callbacks.push(callback);
        self.shared.wake.notify_one();
    }
}

impl Drop for TimerVsync {
    fn drop(&mut self) {
        self.shared.state.lock().running = false;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            // A callback may own the last handle to the source.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl fmt::Debug for TimerVsync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerVsync")
            .field("period", &self.period)
            .field("pending", &self.shared.state.lock().callbacks.len())
            .finish()
    }
}

fn run(shared: &Shared, period: Duration) {
    let origin = Instant::now();
    let period_nanos = period.as_nanos().max(1);
    loop {
        let mut state = shared.state.lock();
        while state.running && state.callbacks.is_empty() {
            shared.wake.wait(&mut state);
        }
        if !state.running {
            return;
        }

        let frame_index = origin.elapsed().as_nanos() / period_nanos + 1;
        let offset = u64::try_from(frame_index * period_nanos).unwrap_or(u64::MAX);
        let deadline = origin + Duration::from_nanos(offset);
        while state.running && Instant::now() < deadline {
            shared.wake.wait_until(&mut state, deadline);
        }
        if !state.running {
            return;
        }

        let callbacks = mem::take(&mut state.callbacks);
        drop(state);
        let tick = FrameTick {
            timestamp: deadline,
            period,
            frame_index: u64::try_from(frame_index).unwrap_or(u64::MAX),
        };
        for callback in callbacks {
            callback(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use rnoh_core::VsyncSource;

    use super::TimerVsync;

    #[test]
    fn delivers_increasing_ticks() {
        let vsync = TimerVsync::with_period(Duration::from_millis(2)).expect("vsync thread");
        let (sender, receiver) = mpsc::channel();
        let first = sender.clone();
        vsync.request_frame(Box::new(move |tick| {
            let _ = first.send(tick);
        }));
        let a = receiver
            .recv_timeout(Duration::from_secs(2))
            .expect("first tick");
        vsync.request_frame(Box::new(move |tick| {
            let _ = sender.send(tick);
        }));
        let b = receiver
            .recv_timeout(Duration::from_secs(2))
            .expect("second tick");
        assert!(b.frame_index > a.frame_index);
        assert!(b.timestamp > a.timestamp);
        assert_eq!(a.period, Duration::from_millis(2));
    }

    #[test]
    fn drop_stops_with_pending_callbacks() {
        let vsync = TimerVsync::with_period(Duration::from_secs(60)).expect("vsync thread");
        vsync.request_frame(Box::new(|_| {}));
        drop(vsync);
    }
}
