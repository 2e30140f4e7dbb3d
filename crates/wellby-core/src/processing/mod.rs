//! On-device PPG analysis
//!
//! Turns one completed recording buffer into HRV metrics:
//!
//! ```text
//! raw ─► bandpass ─► trim ─► moving average ─► valleys ─► segment quality
//!                                                              │
//!            HRV metrics ◄── RR intervals ◄── peaks ◄──────────┘
//! ```
//!
//! Every stage returns owned, caller-scoped vectors; nothing outlives a single
//! [`pipeline::analyze`] call.

pub mod extrema;
pub mod filters;
pub mod hrv;
pub mod pipeline;
pub mod quality;

pub use extrema::{Segment, detect_peaks, detect_valleys, pair_valleys};
pub use hrv::{HrvMetrics, rr_intervals};
pub use pipeline::{AnalysisReport, analyze};

/// Arithmetic mean, `0.0` for an empty slice.
pub(crate) fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
