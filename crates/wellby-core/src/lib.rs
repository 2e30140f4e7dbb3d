//! Hardware-independent core library for the wellby PPG wearable
//!
//! This crate contains all platform-agnostic logic of the device: the
//! recording session and its transport framing, the sensor and transport
//! traits the firmware plugs into, battery classification, and the on-device
//! HRV analysis pipeline.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod config;
pub mod power;
pub mod processing;
pub mod recording;
pub mod sensors;
pub mod transport;

#[cfg(test)]
mod testing;
