//! Battery status
//!
//! Voltage is read through a divider on an ADC pin and reduced to the three
//! bands the companion app shows.

use log::info;
use serde::{Deserialize, Serialize};

const ADC_FULL_SCALE: f32 = 4096.0;
const ADC_REFERENCE_V: f32 = 3.6;
/// Calibrated ratio of the battery divider
const DIVIDER_RATIO: f32 = 2.961;

/// Below this the battery is low.
pub const LOW_BELOW_V: f32 = 3.5;
/// From this up the battery is good.
pub const GOOD_FROM_V: f32 = 3.9;

/// Battery voltage for a raw 12-bit ADC reading.
pub fn adc_to_voltage(reading: u16) -> f32 {
    DIVIDER_RATIO * ADC_REFERENCE_V * reading as f32 / ADC_FULL_SCALE
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryStatus {
    Good,
    Medium,
    Low,
    /// No reading taken yet
    #[default]
    Unknown,
}

impl BatteryStatus {
    pub fn from_voltage(voltage: f32) -> Self {
        if voltage < LOW_BELOW_V {
            Self::Low
        } else if voltage < GOOD_FROM_V {
            Self::Medium
        } else {
            Self::Good
        }
    }

    /// Notification byte.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Good => b'G',
            Self::Medium => b'Y',
            Self::Low => b'R',
            Self::Unknown => b'U',
        }
    }
}

pub trait PowerSource {
    fn read_voltage(&mut self) -> f32;

    fn read_status(&mut self) -> BatteryStatus {
        BatteryStatus::from_voltage(self.read_voltage())
    }
}

/// Tracks the last reported battery band.
pub struct BatteryMonitor<P> {
    source: P,
    status: BatteryStatus,
}

impl<P: PowerSource> BatteryMonitor<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            status: BatteryStatus::Unknown,
        }
    }

    /// Take a fresh reading.
    pub fn refresh(&mut self) -> BatteryStatus {
        let voltage = self.source.read_voltage();
        let status = BatteryStatus::from_voltage(voltage);
        if status != self.status {
            info!("Battery {:?} -> {:?} ({voltage:.2} V)", self.status, status);
            self.status = status;
        }
        status
    }

    pub fn status(&self) -> BatteryStatus {
        self.status
    }

    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedPower;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(BatteryStatus::from_voltage(3.49), BatteryStatus::Low);
        assert_eq!(BatteryStatus::from_voltage(3.50), BatteryStatus::Medium);
        assert_eq!(BatteryStatus::from_voltage(3.89), BatteryStatus::Medium);
        assert_eq!(BatteryStatus::from_voltage(3.90), BatteryStatus::Good);
    }

    #[test]
    fn test_notification_bytes() {
        assert_eq!(BatteryStatus::Good.as_byte(), b'G');
        assert_eq!(BatteryStatus::Medium.as_byte(), b'Y');
        assert_eq!(BatteryStatus::Low.as_byte(), b'R');
        assert_eq!(BatteryStatus::default().as_byte(), b'U');
    }

    #[test]
    fn test_adc_conversion() {
        assert!((adc_to_voltage(4096) - 10.6596).abs() < 1e-3);
        assert!((adc_to_voltage(1500) - 3.9037).abs() < 1e-3);
        assert_eq!(BatteryStatus::from_voltage(adc_to_voltage(1500)), BatteryStatus::Good);
    }

    #[test]
    fn test_monitor_reports_unknown_until_first_reading() {
        let mut monitor = BatteryMonitor::new(FixedPower { voltage: 3.7 });
        assert_eq!(monitor.status(), BatteryStatus::Unknown);

        assert_eq!(monitor.refresh(), BatteryStatus::Medium);
        assert_eq!(monitor.status(), BatteryStatus::Medium);

        monitor.source_mut().voltage = 3.2;
        assert_eq!(monitor.refresh(), BatteryStatus::Low);
        assert_eq!(monitor.source_mut().read_status(), BatteryStatus::Low);
    }
}
