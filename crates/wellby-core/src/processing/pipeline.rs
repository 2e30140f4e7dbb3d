//! End-to-end analysis of one recording buffer

use alloc::vec::Vec;

use log::{debug, info};

use super::{
    HrvMetrics, extrema,
    filters::{bandpass, hold_zero_readings, moving_average, trim_edges},
    hrv::{rr_consistency, rr_intervals},
    quality::eliminate_noise,
};
use crate::config::AnalysisConfig;

/// Everything the pipeline derived from one recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    /// Samples left after edge trimming
    pub conditioned_len: usize,
    pub valleys: Vec<usize>,
    pub segments_kept: usize,
    pub segments_rejected: usize,
    /// Peak indices into the quality-filtered signal
    pub peaks: Vec<usize>,
    pub rr_intervals: Vec<u32>,
    /// Spread of the RR intervals, `None` below two intervals
    pub rr_consistency_ms: Option<f32>,
    pub metrics: Option<HrvMetrics>,
}

/// Fills zero readings in place, then runs bandpass, trim, smoothing, valley detection,
/// segment rejection, peak detection, RR extraction and HRV over `raw`.
///
/// Short or flat recordings produce a report with empty stages and no metrics.
pub fn analyze(raw: &[u32], config: &AnalysisConfig) -> AnalysisReport {
    let fs = config.sampling_rate_hz;

    let zeros = raw.iter().filter(|&&sample| sample == 0).count();
    if zeros > 0 {
        debug!("Holding {zeros} zero readings at the previous value");
    }
    let samples = hold_zero_readings(raw);

    let filtered = bandpass(&samples);
    let trimmed = trim_edges(&filtered, config.edge_trim);
    let smoothed = moving_average(trimmed, config.moving_average_window);

    let valleys = extrema::detect_valleys(&smoothed, fs, config.valley_min_distance_s);
    let segments = extrema::pair_valleys(&valleys);
    let quality = eliminate_noise(&smoothed, &segments, &config.noise_offsets);
    debug!(
        "{} valleys, {} segments kept, {} rejected",
        valleys.len(),
        quality.kept.len(),
        quality.rejected
    );

    let peaks = extrema::detect_peaks(
        &quality.signal,
        fs,
        config.peak_threshold_factor,
        config.peak_min_distance_s,
    );
    let rr = rr_intervals(&peaks, fs);
    let metrics = HrvMetrics::from_rr(&rr);
    let rr_consistency_ms = rr_consistency(&rr);

    match &metrics {
        Some(m) => info!(
            "HRV from {} samples: HR {:.1} bpm, SDNN {:.1} ms, RMSSD {:?} ms ({} intervals)",
            raw.len(),
            m.heart_rate_bpm,
            m.sdnn_ms,
            m.rmssd_ms,
            rr.len()
        ),
        None => info!(
            "No HRV from {} samples: {} peaks, {} valid intervals",
            raw.len(),
            peaks.len(),
            rr.len()
        ),
    }

    AnalysisReport {
        conditioned_len: smoothed.len(),
        valleys,
        segments_kept: quality.kept.len(),
        segments_rejected: quality.rejected,
        peaks,
        rr_intervals: rr,
        rr_consistency_ms,
        metrics,
    }
}
