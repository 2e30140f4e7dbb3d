//! In-memory stand-ins for hardware, shared by the unit tests.

use alloc::vec::Vec;

use embedded_hal_async::delay::DelayNs;

use crate::power::PowerSource;
use crate::sensors::{SampleSource, SensorError};
use crate::transport::{Characteristic, Transport};

pub struct NoopDelay;

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// Sensor returning `next`, `next + step`, ... and counting every call.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    pub next: u32,
    pub step: u32,
    /// Every n-th read fails
    pub fail_every: Option<u32>,
    pub fail_power_on: bool,
    /// Number of `init` calls that fail before one succeeds
    pub init_failures: u32,
    pub powered: bool,
    pub reads: u32,
    pub init_calls: u32,
    pub power_on_calls: u32,
    pub power_off_calls: u32,
}

impl ScriptedSensor {
    pub fn counting(start: u32) -> Self {
        Self {
            next: start,
            step: 1,
            ..Self::default()
        }
    }

    pub fn constant(value: u32) -> Self {
        Self {
            next: value,
            step: 0,
            ..Self::default()
        }
    }
}

impl SampleSource for ScriptedSensor {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(SensorError::Unavailable {
                sensor: "scripted",
                details: "not yet attached",
            });
        }
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<u32, SensorError> {
        self.reads += 1;
        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return Err(SensorError::ReadFailed {
                sensor: "scripted",
                operation: "read sample",
                details: "scripted failure",
            });
        }
        let value = self.next;
        self.next = self.next.wrapping_add(self.step);
        Ok(value)
    }

    async fn power_on(&mut self) -> Result<(), SensorError> {
        self.power_on_calls += 1;
        if self.fail_power_on {
            return Err(SensorError::ReadFailed {
                sensor: "scripted",
                operation: "power on",
                details: "scripted failure",
            });
        }
        self.powered = true;
        Ok(())
    }

    async fn power_off(&mut self) -> Result<(), SensorError> {
        self.power_off_calls += 1;
        self.powered = false;
        Ok(())
    }
}

/// Records every notification while a peer is subscribed.
#[derive(Debug, Default)]
pub struct TestTransport {
    pub subscribed: bool,
    pub sent: Vec<(Characteristic, Vec<u8>)>,
}

impl TestTransport {
    pub fn connected() -> Self {
        Self {
            subscribed: true,
            sent: Vec::new(),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn sent_on(&self, characteristic: Characteristic) -> impl Iterator<Item = &[u8]> {
        self.sent
            .iter()
            .filter(move |(c, _)| *c == characteristic)
            .map(|(_, payload)| payload.as_slice())
    }
}

impl Transport for TestTransport {
    fn notify(&mut self, characteristic: Characteristic, payload: &[u8]) -> bool {
        if !self.subscribed {
            return false;
        }
        self.sent.push((characteristic, payload.to_vec()));
        true
    }
}

pub struct FixedPower {
    pub voltage: f32,
}

impl PowerSource for FixedPower {
    fn read_voltage(&mut self) -> f32 {
        self.voltage
    }
}
