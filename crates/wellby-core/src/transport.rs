//! Wireless surface of the device
//!
//! The radio stack lives outside this crate; it only has to deliver bytes to
//! a subscribed peer through [`Transport`] and feed control writes into
//! [`crate::app_state::CommandSender`].

use log::warn;
use thiserror_no_std::Error;

use crate::processing::HrvMetrics;
use crate::recording::FRAME_LEN;

/// Primary GATT service (custom 128-bit)
pub const SERVICE_UUID: u128 = 0x2ef946af_49fc_43f4_95c1_882a483f0a76;
/// Raw PPG frames (notify)
pub const RAW_PPG_CHAR_UUID: u128 = 0x4aa76196_2777_4205_8260_8e3274beb327;
/// HRV record (notify)
pub const HRV_CHAR_UUID: u128 = 0x8881ab16_7694_4891_aebe_b0b11c6549d4;
/// Battery status byte (notify)
pub const BATTERY_CHAR_UUID: u128 = 0xa20a1ce0_5f2e_4230_88fe_05eb329dc545;
/// Recording start/stop (write)
pub const RECORDING_CONTROL_CHAR_UUID: u128 = 0x684c8f42_a60c_431c_b8ed_251e966d6a9a;

/// Raw PPG characteristic size; one frame plus headroom.
pub const RAW_PPG_CHAR_LEN: usize = 20;
pub const HRV_RECORD_LEN: usize = 128;
pub const BATTERY_CHAR_LEN: usize = 1;

const _: () = assert!(FRAME_LEN <= RAW_PPG_CHAR_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    RawPpg,
    HrvMetrics,
    BatteryStatus,
    RecordingControl,
}

impl Characteristic {
    pub const fn uuid(self) -> u128 {
        match self {
            Self::RawPpg => RAW_PPG_CHAR_UUID,
            Self::HrvMetrics => HRV_CHAR_UUID,
            Self::BatteryStatus => BATTERY_CHAR_UUID,
            Self::RecordingControl => RECORDING_CONTROL_CHAR_UUID,
        }
    }

    /// Declared value length.
    pub const fn max_len(self) -> usize {
        match self {
            Self::RawPpg => RAW_PPG_CHAR_LEN,
            Self::HrvMetrics => HRV_RECORD_LEN,
            Self::BatteryStatus | Self::RecordingControl => 1,
        }
    }
}

/// Best-effort delivery to a subscribed peer.
pub trait Transport {
    /// Returns `false` when nobody is subscribed; the payload is then lost.
    fn notify(&mut self, characteristic: Characteristic, payload: &[u8]) -> bool;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("control write of {length} bytes, expected 1")]
    InvalidLength { length: usize },
    #[error("unknown control opcode {opcode:#04x}")]
    UnknownOpcode { opcode: u8 },
    #[error("command queue full")]
    QueueFull,
}

/// Remote start/stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    Stop,
    Start,
}

impl RecordingCommand {
    pub const STOP: u8 = 0x00;
    pub const START: u8 = 0x01;

    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Stop => Self::STOP,
            Self::Start => Self::START,
        }
    }
}

impl TryFrom<&[u8]> for RecordingCommand {
    type Error = CommandError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        match payload {
            [Self::START] => Ok(Self::Start),
            [Self::STOP] => Ok(Self::Stop),
            [opcode] => {
                warn!("Ignoring unknown recording opcode {opcode:#04x}");
                Err(CommandError::UnknownOpcode { opcode: *opcode })
            }
            _ => {
                warn!("Ignoring {}-byte recording control write", payload.len());
                Err(CommandError::InvalidLength {
                    length: payload.len(),
                })
            }
        }
    }
}

/// Serialise metrics into the fixed-size HRV characteristic value, zero padded.
pub fn encode_hrv_record(metrics: &HrvMetrics) -> Result<[u8; HRV_RECORD_LEN], postcard::Error> {
    let mut record = [0u8; HRV_RECORD_LEN];
    postcard::to_slice(metrics, &mut record)?;
    Ok(record)
}

pub fn decode_hrv_record(record: &[u8]) -> Result<HrvMetrics, postcard::Error> {
    postcard::from_bytes(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &[u8]) -> Result<RecordingCommand, CommandError> {
        RecordingCommand::try_from(payload)
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(parse(&[0x01]), Ok(RecordingCommand::Start));
        assert_eq!(parse(&[0x00]), Ok(RecordingCommand::Stop));
        assert_eq!(RecordingCommand::Start.to_byte(), 0x01);
    }

    #[test]
    fn test_invalid_control_writes() {
        assert_eq!(
            parse(&[0x02]),
            Err(CommandError::UnknownOpcode { opcode: 0x02 })
        );
        assert_eq!(
            parse(&[]),
            Err(CommandError::InvalidLength { length: 0 })
        );
        assert_eq!(
            parse(&[0x01, 0x00]),
            Err(CommandError::InvalidLength { length: 2 })
        );
    }

    #[test]
    fn test_characteristic_surface() {
        assert_eq!(
            Characteristic::RawPpg.uuid(),
            0x4aa76196_2777_4205_8260_8e3274beb327
        );
        assert_eq!(Characteristic::HrvMetrics.max_len(), 128);
        assert_eq!(Characteristic::BatteryStatus.max_len(), 1);
    }

    #[test]
    fn test_hrv_record_is_fixed_size_and_readable() {
        let metrics = HrvMetrics {
            heart_rate_bpm: 72.5,
            sdnn_ms: 41.0,
            rmssd_ms: None,
            rr_count: 70,
        };

        let record = encode_hrv_record(&metrics).unwrap();
        assert_eq!(record.len(), HRV_RECORD_LEN);
        assert!(record[32..].iter().all(|&b| b == 0));
        assert_eq!(decode_hrv_record(&record).unwrap(), metrics);
    }
}
