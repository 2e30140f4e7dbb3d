//! Optical sensor access
//!
//! The recording session only sees [`SampleSource`]: one raw green-channel
//! intensity per read, plus power control. [`max30105`] implements it over an
//! async I2C bus.

pub mod max30105;

pub use max30105::Max30105;

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::config::SensorConfig;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not detected: {details}")]
    Unavailable {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} read failed during {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// A PPG front end that yields one raw intensity reading per call.
pub trait SampleSource {
    /// Detect and configure the device, leaving it powered down.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Wait for and return the next raw reading.
    fn read_sample(&mut self) -> impl Future<Output = Result<u32, SensorError>>;

    fn power_on(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    fn power_off(&mut self) -> impl Future<Output = Result<(), SensorError>>;
}

/// Outcome of a wear-detection window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityReport {
    /// Mean of the successful reads
    pub average: f32,
    pub samples: u32,
    /// `average` exceeded the configured threshold
    pub worn: bool,
}

/// Samples a powered sensor every `proximity_interval_ms` across
/// `proximity_window_ms` and averages the readings.
///
/// Failed reads are skipped. The caller owns power sequencing.
pub async fn sample_proximity<S: SampleSource, D: DelayNs>(
    sensor: &mut S,
    delay: &mut D,
    config: &SensorConfig,
) -> Result<ProximityReport, SensorError> {
    let reads = (config.proximity_window_ms / config.proximity_interval_ms.max(1)).max(1);

    let mut sum = 0.0f32;
    let mut samples = 0u32;
    let mut last_error = None;

    for _ in 0..reads {
        match sensor.read_sample().await {
            Ok(value) => {
                sum += value as f32;
                samples += 1;
            }
            Err(e) => {
                warn!("Proximity read skipped: {e}");
                last_error = Some(e);
            }
        }
        delay.delay_ms(config.proximity_interval_ms).await;
    }

    if samples == 0 {
        return Err(last_error.unwrap_or(SensorError::Timeout {
            sensor: "PPG",
            operation: "proximity window",
        }));
    }

    let average = sum / samples as f32;
    let worn = average > config.proximity_threshold;
    info!("Proximity average {average:.0} over {samples} reads, worn: {worn}");

    Ok(ProximityReport {
        average,
        samples,
        worn,
    })
}
