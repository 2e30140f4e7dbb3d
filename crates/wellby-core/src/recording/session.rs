use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use log::{debug, error, info, warn};

use super::{
    FrameBatcher, FrameDelivery, RECORDING_BUFFER_LEN, RecordingWindow, SessionError, TickOutcome,
};
use crate::clock::Clock;
use crate::config::{RecordingConfig, SensorConfig};
use crate::sensors::{self, ProximityReport, SampleSource, SensorError};
use crate::transport::{Characteristic, Transport};

/// Start/stop state machine for one sensor.
///
/// The sensor is powered exactly while the window is active.
pub struct RecordingSession<S, C> {
    sensor: S,
    clock: C,
    window: RecordingWindow,
    batcher: FrameBatcher,
    buffer: Vec<u32, RECORDING_BUFFER_LEN>,
    frames_delivered: u32,
    frames_dropped: u32,
}

impl<S: SampleSource, C: Clock> RecordingSession<S, C> {
    pub fn new(sensor: S, clock: C, config: &RecordingConfig) -> Self {
        Self {
            sensor,
            clock,
            window: RecordingWindow::new(Duration::from_millis(config.duration_ms as u64)),
            batcher: FrameBatcher::new(),
            buffer: Vec::new(),
            frames_delivered: 0,
            frames_dropped: 0,
        }
    }

    /// Begin (or re-arm) a window.
    ///
    /// Clears the analysis buffer and any half-built frame. If the sensor
    /// cannot be powered the window stays inactive.
    pub async fn start(&mut self) -> Result<(), SensorError> {
        if self.window.active {
            info!("Recording already active, re-arming window");
        }

        self.buffer.clear();
        let dropped = self.batcher.discard_partial();
        if dropped > 0 {
            debug!("Discarded {dropped} samples of a partial frame");
        }
        self.frames_delivered = 0;
        self.frames_dropped = 0;

        if let Err(e) = self.sensor.power_on().await {
            error!("Recording not started: {e}");
            self.window.active = false;
            if let Err(e) = self.sensor.power_off().await {
                error!("Sensor power-down after failed start: {e}");
            }
            return Err(e);
        }

        self.window.start = self.clock.now();
        self.window.active = true;
        info!("Recording started for {} ms", self.window.budget.as_millis());
        Ok(())
    }

    /// End the window and power the sensor down. Does nothing when already stopped.
    pub async fn stop(&mut self) {
        if !self.window.active {
            debug!("Recording already stopped");
            return;
        }
        self.window.active = false;

        let dropped = self.batcher.discard_partial();
        if dropped > 0 {
            debug!("Discarded {dropped} samples of a partial frame");
        }
        if let Err(e) = self.sensor.power_off().await {
            error!("Sensor power-down failed: {e}");
        }

        info!(
            "Recording stopped: {} samples buffered, {} frames sent, {} dropped",
            self.buffer.len(),
            self.frames_delivered,
            self.frames_dropped
        );
    }

    /// Advance the window by one sample.
    ///
    /// Once the budget is spent the first tick stops the window instead of
    /// sampling.
    pub async fn tick<T: Transport>(&mut self, transport: &mut T) -> TickOutcome {
        if !self.window.active {
            return TickOutcome::Idle;
        }

        let now = self.clock.now();
        if self.window.is_expired(now) {
            info!(
                "Recording window elapsed after {} ms",
                self.window.elapsed(now).as_millis()
            );
            self.stop().await;
            return TickOutcome::TimedOut;
        }

        let sample = match self.sensor.read_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Sample skipped: {e}");
                return TickOutcome::Skipped(e);
            }
        };

        // Past the analysis budget samples are streamed only.
        let _ = self.buffer.push(sample);

        let frame = self.batcher.push(sample).map(|frame| {
            if transport.notify(Characteristic::RawPpg, &frame) {
                self.frames_delivered += 1;
                FrameDelivery::Delivered
            } else {
                self.frames_dropped += 1;
                debug!("No peer subscribed, frame dropped");
                FrameDelivery::Dropped
            }
        });

        TickOutcome::Sampled { sample, frame }
    }

    /// Wear detection over a bounded window of reads.
    ///
    /// Blocks for the configured proximity window, so it is refused while a
    /// recording is active.
    pub async fn check_proximity<D: DelayNs>(
        &mut self,
        delay: &mut D,
        config: &SensorConfig,
    ) -> Result<ProximityReport, SessionError> {
        if self.window.active {
            warn!("Proximity check refused during recording");
            return Err(SessionError::Busy);
        }

        if let Err(e) = self.sensor.power_on().await {
            error!("Proximity check not started: {e}");
            if let Err(e) = self.sensor.power_off().await {
                error!("Sensor power-down after failed proximity start: {e}");
            }
            return Err(SessionError::Sensor(e));
        }
        let report = sensors::sample_proximity(&mut self.sensor, delay, config).await;
        if let Err(e) = self.sensor.power_off().await {
            error!("Sensor power-down after proximity check failed: {e}");
        }
        report.map_err(SessionError::from)
    }

    pub fn is_active(&self) -> bool {
        self.window.active
    }

    pub fn window(&self) -> &RecordingWindow {
        &self.window
    }

    /// Samples buffered for analysis in the current or last window.
    pub fn recording(&self) -> &[u32] {
        &self.buffer
    }

    /// The analysis buffer is full.
    pub fn is_data_collected(&self) -> bool {
        self.buffer.is_full()
    }

    pub fn frames_delivered(&self) -> u32 {
        self.frames_delivered
    }

    pub fn frames_dropped(&self) -> u32 {
        self.frames_dropped
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
