//! Live-stream framing
//!
//! Each sample is narrowed to its low 16 bits and sent as
//! `[high, low, 0xFE]`. Six samples make one 18-byte notification.

use heapless::Vec;
use thiserror_no_std::Error;

pub const FRAME_SAMPLES: usize = 6;
pub const BYTES_PER_SAMPLE: usize = 3;
pub const FRAME_LEN: usize = FRAME_SAMPLES * BYTES_PER_SAMPLE;
pub const SAMPLE_DELIMITER: u8 = 0xFE;

pub type Frame = Vec<u8, FRAME_LEN>;

/// Wire encoding of one sample. Bits above the low 16 are dropped.
pub const fn encode_sample(sample: u32) -> [u8; BYTES_PER_SAMPLE] {
    let [high, low] = (sample as u16).to_be_bytes();
    [high, low, SAMPLE_DELIMITER]
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame length {length} is not a whole number of samples")]
    Length { length: usize },
    #[error("missing delimiter at byte {offset}")]
    Delimiter { offset: usize },
}

/// Receiver side: recover the 16-bit samples from one frame.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<u16, FRAME_SAMPLES>, FrameError> {
    if frame.len() % BYTES_PER_SAMPLE != 0 || frame.len() > FRAME_LEN {
        return Err(FrameError::Length {
            length: frame.len(),
        });
    }
    let mut samples = Vec::new();
    for (i, chunk) in frame.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
        if chunk[2] != SAMPLE_DELIMITER {
            return Err(FrameError::Delimiter {
                offset: i * BYTES_PER_SAMPLE + 2,
            });
        }
        // capacity matches the length check above
        let _ = samples.push(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    Ok(samples)
}

/// Accumulates encoded samples until a full frame is ready.
#[derive(Debug, Default)]
pub struct FrameBatcher {
    pending: Frame,
}

impl FrameBatcher {
    pub const fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Append one sample; returns the frame it completed, if any.
    pub fn push(&mut self, sample: u32) -> Option<Frame> {
        // Full frames are handed out below, so one more sample always fits.
        let _ = self.pending.extend_from_slice(&encode_sample(sample));
        if self.pending.is_full() {
            Some(core::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len() / BYTES_PER_SAMPLE
    }

    /// Drop a partially filled frame, returning how many samples it held.
    pub fn discard_partial(&mut self) -> usize {
        let dropped = self.pending_samples();
        self.pending.clear();
        dropped
    }
}
