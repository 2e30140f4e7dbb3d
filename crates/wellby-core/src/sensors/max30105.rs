//! MAX30105 optical particle / PPG sensor
//!
//! Runs in multi-LED mode with red and IR slots present but dark and the green
//! slot carrying the PPG signal. Only the newest green reading of each FIFO
//! drain is returned; older entries are discarded.

use embedded_hal_async::{delay::DelayNs, i2c::I2c};
use log::{debug, error, info};

use super::{SampleSource, SensorError};
use crate::config::SensorConfig;

const SENSOR: &str = "MAX30105";

pub const I2C_ADDRESS: u8 = 0x57;
pub const EXPECTED_PART_ID: u8 = 0x15;

mod reg {
    pub const FIFO_WR_PTR: u8 = 0x04;
    pub const FIFO_OVF_COUNTER: u8 = 0x05;
    pub const FIFO_RD_PTR: u8 = 0x06;
    pub const FIFO_DATA: u8 = 0x07;
    pub const FIFO_CONFIG: u8 = 0x08;
    pub const MODE_CONFIG: u8 = 0x09;
    pub const SPO2_CONFIG: u8 = 0x0A;
    pub const LED1_PULSE_AMP: u8 = 0x0C;
    pub const LED2_PULSE_AMP: u8 = 0x0D;
    pub const LED3_PULSE_AMP: u8 = 0x0E;
    pub const MULTI_LED_CONFIG1: u8 = 0x11;
    pub const MULTI_LED_CONFIG2: u8 = 0x12;
    pub const PART_ID: u8 = 0xFF;
}

const MODE_SHUTDOWN: u8 = 0x80;
const MODE_RESET: u8 = 0x40;
const MODE_MULTI_LED: u8 = 0x07;
const FIFO_ROLLOVER: u8 = 0x10;

const SLOT_RED: u8 = 0x01;
const SLOT_IR: u8 = 0x02;
const SLOT_GREEN: u8 = 0x03;

const ACTIVE_SLOTS: usize = 3;
const BYTES_PER_SLOT: usize = 3;
const BYTES_PER_SAMPLE: usize = ACTIVE_SLOTS * BYTES_PER_SLOT;
const FIFO_DEPTH: usize = 32;
const SAMPLE_MASK: u32 = 0x3_FFFF;

const RESET_POLL_ATTEMPTS: u32 = 100;

pub struct Max30105<I, D> {
    i2c: I,
    delay: D,
    config: SensorConfig,
}

impl<I: I2c, D: DelayNs> Max30105<I, D> {
    pub fn new(i2c: I, delay: D, config: SensorConfig) -> Self {
        Self { i2c, delay, config }
    }

    /// Give back the bus and delay provider.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn read_register(
        &mut self,
        register: u8,
        operation: &'static str,
    ) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(I2C_ADDRESS, &[register], &mut value)
            .await
            .map_err(|e| {
                error!("{SENSOR} {operation} failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error",
                }
            })?;
        Ok(value[0])
    }

    async fn write_register(
        &mut self,
        register: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c.write(I2C_ADDRESS, &[register, value]).await.map_err(|e| {
            error!("{SENSOR} {operation} failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: SENSOR,
                operation,
                details: "I2C communication error",
            }
        })
    }

    /// Read-modify-write of the bits selected by `mask`.
    async fn update_register(
        &mut self,
        register: u8,
        mask: u8,
        bits: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        let current = self.read_register(register, operation).await?;
        self.write_register(register, (current & !mask) | (bits & mask), operation)
            .await
    }

    async fn soft_reset(&mut self) -> Result<(), SensorError> {
        self.write_register(reg::MODE_CONFIG, MODE_RESET, "soft reset").await?;
        for _ in 0..RESET_POLL_ATTEMPTS {
            let mode = self.read_register(reg::MODE_CONFIG, "soft reset").await?;
            if mode & MODE_RESET == 0 {
                return Ok(());
            }
            self.delay.delay_ms(1).await;
        }
        Err(SensorError::Timeout {
            sensor: SENSOR,
            operation: "soft reset",
        })
    }

    async fn clear_fifo(&mut self) -> Result<(), SensorError> {
        self.write_register(reg::FIFO_WR_PTR, 0, "clear FIFO").await?;
        self.write_register(reg::FIFO_OVF_COUNTER, 0, "clear FIFO").await?;
        self.write_register(reg::FIFO_RD_PTR, 0, "clear FIFO").await
    }

    /// Unread sample sets waiting in the FIFO.
    ///
    /// Equal pointers mean either empty or completely full; a non-zero
    /// overflow counter tells the two apart.
    async fn available(&mut self) -> Result<usize, SensorError> {
        let write = self.read_register(reg::FIFO_WR_PTR, "read FIFO pointers").await?;
        let read = self.read_register(reg::FIFO_RD_PTR, "read FIFO pointers").await?;
        let unread = (write.wrapping_sub(read) & 0x1F) as usize;
        if unread > 0 {
            return Ok(unread);
        }

        let overflow = self
            .read_register(reg::FIFO_OVF_COUNTER, "read FIFO overflow")
            .await?;
        if overflow > 0 {
            debug!("{SENSOR}: FIFO full, {overflow} sample sets overwritten");
            return Ok(FIFO_DEPTH);
        }
        Ok(0)
    }

    /// Drain `count` sample sets, returning the green channel of the newest.
    async fn drain_fifo(&mut self, count: usize) -> Result<u32, SensorError> {
        let mut buf = [0u8; FIFO_DEPTH * BYTES_PER_SAMPLE];
        let len = count.min(FIFO_DEPTH) * BYTES_PER_SAMPLE;
        self.i2c
            .write_read(I2C_ADDRESS, &[reg::FIFO_DATA], &mut buf[..len])
            .await
            .map_err(|e| {
                error!("{SENSOR} FIFO read failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation: "read FIFO data",
                    details: "I2C communication error",
                }
            })?;

        let green = &buf[len - BYTES_PER_SLOT..len];
        let raw = u32::from_be_bytes([0, green[0], green[1], green[2]]);
        Ok(raw & SAMPLE_MASK)
    }

    fn config_bits(&self) -> Result<(u8, u8), SensorError> {
        let invalid = |details: &'static str| SensorError::InitializationFailed {
            sensor: SENSOR,
            details,
        };

        let average = match self.config.sample_average {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            16 => 4,
            32 => 5,
            _ => return Err(invalid("unsupported sample averaging")),
        };
        let adc_range = match self.config.adc_range_na {
            2048 => 0,
            4096 => 1,
            8192 => 2,
            16384 => 3,
            _ => return Err(invalid("unsupported ADC range")),
        };
        let sample_rate = match self.config.sample_rate_hz {
            50 => 0,
            100 => 1,
            200 => 2,
            400 => 3,
            800 => 4,
            1000 => 5,
            1600 => 6,
            3200 => 7,
            _ => return Err(invalid("unsupported sample rate")),
        };
        let pulse_width = match self.config.pulse_width_us {
            69 => 0,
            118 => 1,
            215 => 2,
            411 => 3,
            _ => return Err(invalid("unsupported pulse width")),
        };

        let fifo = (average << 5) | FIFO_ROLLOVER;
        let spo2 = (adc_range << 5) | (sample_rate << 2) | pulse_width;
        Ok((fifo, spo2))
    }
}

impl<I: I2c, D: DelayNs> SampleSource for Max30105<I, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        let part_id = self.read_register(reg::PART_ID, "read part ID").await.map_err(|_| {
            SensorError::Unavailable {
                sensor: SENSOR,
                details: "no response at I2C address 0x57",
            }
        })?;
        if part_id != EXPECTED_PART_ID {
            error!("{SENSOR}: unexpected part ID {part_id:#04x}");
            return Err(SensorError::Unavailable {
                sensor: SENSOR,
                details: "unexpected part ID",
            });
        }

        let (fifo, spo2) = self.config_bits()?;

        self.soft_reset().await?;
        self.write_register(reg::FIFO_CONFIG, fifo, "configure FIFO").await?;
        self.write_register(reg::MODE_CONFIG, MODE_MULTI_LED, "configure mode").await?;
        self.write_register(reg::SPO2_CONFIG, spo2, "configure ADC").await?;

        let brightness = self.config.led_brightness;
        self.write_register(reg::LED1_PULSE_AMP, 0, "configure red LED").await?;
        self.write_register(reg::LED2_PULSE_AMP, 0, "configure IR LED").await?;
        self.write_register(reg::LED3_PULSE_AMP, brightness, "configure green LED")
            .await?;

        self.write_register(reg::MULTI_LED_CONFIG1, SLOT_RED | (SLOT_IR << 4), "configure slots")
            .await?;
        self.write_register(reg::MULTI_LED_CONFIG2, SLOT_GREEN, "configure slots")
            .await?;

        self.clear_fifo().await?;
        self.power_off().await?;

        info!(
            "{SENSOR} ready: {} Hz / {} averaging, green LED {}",
            self.config.sample_rate_hz, self.config.sample_average, brightness
        );
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<u32, SensorError> {
        let mut waited_ms = 0u32;
        loop {
            let count = self.available().await?;
            if count > 0 {
                return self.drain_fifo(count).await;
            }
            if waited_ms >= self.config.fifo_timeout_ms {
                debug!("{SENSOR}: FIFO empty after {waited_ms} ms");
                return Err(SensorError::Timeout {
                    sensor: SENSOR,
                    operation: "wait for FIFO data",
                });
            }
            self.delay.delay_ms(1).await;
            waited_ms += 1;
        }
    }

    async fn power_on(&mut self) -> Result<(), SensorError> {
        self.update_register(reg::MODE_CONFIG, MODE_SHUTDOWN, 0, "wake up").await?;
        self.clear_fifo().await
    }

    async fn power_off(&mut self) -> Result<(), SensorError> {
        self.update_register(reg::MODE_CONFIG, MODE_SHUTDOWN, MODE_SHUTDOWN, "shut down")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopDelay;
    use alloc::collections::VecDeque;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    /// Register-map stand-in for the chip.
    struct FakeBus {
        registers: [u8; 256],
        pointer: u8,
        fifo: VecDeque<u8>,
        present: bool,
    }

    impl FakeBus {
        fn new() -> Self {
            let mut registers = [0u8; 256];
            registers[reg::PART_ID as usize] = EXPECTED_PART_ID;
            Self {
                registers,
                pointer: 0,
                fifo: VecDeque::new(),
                present: true,
            }
        }

        fn push_sample(&mut self, red: u32, ir: u32, green: u32) {
            for value in [red, ir, green] {
                let bytes = value.to_be_bytes();
                self.fifo.extend(&bytes[1..]);
            }
        }

        fn register(&self, register: u8) -> u8 {
            self.registers[register as usize]
        }

        fn read_next(&mut self) -> u8 {
            match self.pointer {
                reg::FIFO_WR_PTR => (self.fifo.len() / BYTES_PER_SAMPLE) as u8,
                reg::FIFO_RD_PTR => 0,
                reg::FIFO_DATA => self.fifo.pop_front().unwrap_or(0),
                other => {
                    self.pointer = other.wrapping_add(1);
                    self.registers[other as usize]
                }
            }
        }

        fn write_next(&mut self, value: u8) {
            let stored = if self.pointer == reg::MODE_CONFIG {
                // reset completes instantly and clears itself
                value & !MODE_RESET
            } else {
                value
            };
            self.registers[self.pointer as usize] = stored;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            if !self.present || address != I2C_ADDRESS {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => {
                        if let Some((&register, values)) = bytes.split_first() {
                            self.pointer = register;
                            for &value in values {
                                self.write_next(value);
                            }
                        }
                    }
                    Operation::Read(buffer) => {
                        for byte in buffer.iter_mut() {
                            *byte = self.read_next();
                        }
                    }
                }
            }
            Ok(())
        }
    }

    fn sensor(bus: FakeBus) -> Max30105<FakeBus, NoopDelay> {
        Max30105::new(bus, NoopDelay, SensorConfig::default())
    }

    #[test]
    fn test_init_configures_green_ppg_and_shuts_down() {
        let mut max = sensor(FakeBus::new());
        block_on(max.init()).unwrap();

        let (bus, _) = max.release();
        assert_eq!(bus.register(reg::FIFO_CONFIG), 0x70);
        assert_eq!(bus.register(reg::SPO2_CONFIG), 0x0B);
        assert_eq!(bus.register(reg::MODE_CONFIG), MODE_SHUTDOWN | MODE_MULTI_LED);
        assert_eq!(bus.register(reg::LED1_PULSE_AMP), 0);
        assert_eq!(bus.register(reg::LED2_PULSE_AMP), 0);
        assert_eq!(bus.register(reg::LED3_PULSE_AMP), 255);
        assert_eq!(bus.register(reg::MULTI_LED_CONFIG1), 0x21);
        assert_eq!(bus.register(reg::MULTI_LED_CONFIG2), 0x03);
    }

    #[test]
    fn test_init_missing_device() {
        let mut bus = FakeBus::new();
        bus.present = false;
        let mut max = sensor(bus);

        assert!(matches!(
            block_on(max.init()),
            Err(SensorError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_init_wrong_part_id() {
        let mut bus = FakeBus::new();
        bus.registers[reg::PART_ID as usize] = 0x11;
        let mut max = sensor(bus);

        assert_eq!(
            block_on(max.init()),
            Err(SensorError::Unavailable {
                sensor: SENSOR,
                details: "unexpected part ID",
            })
        );
    }

    #[test]
    fn test_init_rejects_unsupported_rate() {
        let config = SensorConfig {
            sample_rate_hz: 123,
            ..SensorConfig::default()
        };
        let mut max = Max30105::new(FakeBus::new(), NoopDelay, config);

        assert!(matches!(
            block_on(max.init()),
            Err(SensorError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_power_toggles_shutdown_bit() {
        let mut max = sensor(FakeBus::new());
        block_on(max.init()).unwrap();

        block_on(max.power_on()).unwrap();
        assert_eq!(max.i2c.register(reg::MODE_CONFIG), MODE_MULTI_LED);

        block_on(max.power_off()).unwrap();
        assert_eq!(max.i2c.register(reg::MODE_CONFIG), MODE_SHUTDOWN | MODE_MULTI_LED);
    }

    #[test]
    fn test_read_returns_newest_green() {
        let mut bus = FakeBus::new();
        bus.push_sample(1, 2, 40_000);
        bus.push_sample(3, 4, 0x7_1234);
        let mut max = sensor(bus);

        // upper bits beyond the 18-bit ADC word are masked off
        assert_eq!(block_on(max.read_sample()), Ok(0x3_1234));
        assert!(max.i2c.fifo.is_empty());
    }

    #[test]
    fn test_read_drains_full_fifo() {
        let mut bus = FakeBus::new();
        for green in 0..FIFO_DEPTH as u32 {
            bus.push_sample(0, 0, 1_000 + green);
        }
        // write pointer has wrapped onto the read pointer
        bus.registers[reg::FIFO_OVF_COUNTER as usize] = 4;
        let mut max = sensor(bus);

        assert_eq!(block_on(max.read_sample()), Ok(1_031));
        assert!(max.i2c.fifo.is_empty());
    }

    #[test]
    fn test_read_times_out_on_empty_fifo() {
        let mut max = sensor(FakeBus::new());
        assert!(matches!(
            block_on(max.read_sample()),
            Err(SensorError::Timeout { .. })
        ));
    }
}
