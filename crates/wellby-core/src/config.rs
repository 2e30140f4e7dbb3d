use core::fmt::Write;

use alloc::vec::Vec;
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::processing::quality::NoiseOffsets;

/// Maximum length of each half of the advertised device name.
pub const NAME_PART_LEN: usize = 8;

/// Advertised name: `"<prefix> <number>"`.
pub type DeviceName = String<{ NAME_PART_LEN * 2 + 1 }>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeviceConfig {
    pub sensor: SensorConfig,
    pub recording: RecordingConfig,
    pub analysis: AnalysisConfig,
    pub advertising: AdvertisingConfig,
}

impl DeviceConfig {
    /// Encode for persistence (NVM page, host tooling).
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Optical front-end settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorConfig {
    /// Green LED pulse amplitude (0-255)
    pub led_brightness: u8,
    /// Hardware samples averaged into one FIFO entry
    pub sample_average: u8,
    /// ADC conversion rate in Hz before averaging
    pub sample_rate_hz: u16,
    /// LED pulse width in microseconds
    pub pulse_width_us: u16,
    /// Full-scale ADC range in nanoamps
    pub adc_range_na: u16,
    /// Mean green reading above which the sensor counts as worn
    pub proximity_threshold: f32,
    pub proximity_window_ms: u32,
    pub proximity_interval_ms: u32,
    /// How long a read waits for a fresh FIFO entry
    pub fifo_timeout_ms: u32,
}

impl SensorConfig {
    /// Rate at which averaged samples leave the FIFO.
    pub const fn effective_sample_rate_hz(&self) -> u16 {
        if self.sample_average == 0 {
            self.sample_rate_hz
        } else {
            self.sample_rate_hz / self.sample_average as u16
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            led_brightness: 255,
            sample_average: 8,
            sample_rate_hz: 200,
            pulse_width_us: 411,
            adc_range_na: 2048,
            proximity_threshold: 1000.0,
            proximity_window_ms: 3000,
            proximity_interval_ms: 100,
            fifo_timeout_ms: 250,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Length of one recording window
    pub duration_ms: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_ms: 60_000,
        }
    }
}

/// Parameters of the on-device HRV pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub sampling_rate_hz: u16,
    /// Samples dropped at each end after the bandpass stage
    pub edge_trim: usize,
    pub moving_average_window: usize,
    pub valley_min_distance_s: f32,
    pub peak_threshold_factor: f32,
    pub peak_min_distance_s: f32,
    pub noise_offsets: NoiseOffsets,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: SensorConfig::default().effective_sample_rate_hz(),
            edge_trim: 25,
            moving_average_window: 6,
            valley_min_distance_s: 0.4,
            peak_threshold_factor: 0.9,
            peak_min_distance_s: 0.4,
            noise_offsets: NoiseOffsets::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdvertisingConfig {
    pub prefix: String<NAME_PART_LEN>,
    pub number: String<NAME_PART_LEN>,
}

impl AdvertisingConfig {
    pub fn device_name(&self) -> DeviceName {
        let mut name = DeviceName::new();
        // Both halves are bounded by NAME_PART_LEN, so this always fits.
        let _ = write!(name, "{} {}", self.prefix, self.number);
        name
    }
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            prefix: String::try_from("W").unwrap_or_default(),
            number: String::try_from("142").unwrap_or_default(),
        }
    }
}
