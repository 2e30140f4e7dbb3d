//! Recording windows and the live streaming path
//!
//! A [`RecordingSession`] owns the sensor for the length of one window,
//! pushes each sample into the [`FrameBatcher`] and the analysis buffer,
//! and hands completed frames to the transport.

pub mod frame;
mod session;

pub use frame::{FRAME_LEN, Frame, FrameBatcher, decode_frame};
pub use session::RecordingSession;

use embassy_time::{Duration, Instant};
use thiserror_no_std::Error;

use crate::sensors::SensorError;

/// Raw samples kept for on-device analysis: 25 Hz for 30 s.
pub const RECORDING_BUFFER_LEN: usize = 750;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("a recording window is active")]
    Busy,
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
}

/// Start time and budget of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingWindow {
    pub active: bool,
    pub start: Instant,
    pub budget: Duration,
}

impl RecordingWindow {
    pub const fn new(budget: Duration) -> Self {
        Self {
            active: false,
            start: Instant::from_ticks(0),
            budget,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// The budget is used up; the next tick must stop the window.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.budget
    }
}

/// What became of a completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    Delivered,
    /// No subscribed peer; the frame is gone
    Dropped,
}

/// Result of one [`RecordingSession::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No window active
    Idle,
    Sampled {
        sample: u32,
        frame: Option<FrameDelivery>,
    },
    /// The sensor read failed; the window carries on
    Skipped(SensorError),
    /// The budget ran out and the window was stopped
    TimedOut,
}
