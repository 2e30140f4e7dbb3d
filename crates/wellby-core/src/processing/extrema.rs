//! Valley (cycle boundary) and peak (beat) detection
//!
//! Both detectors use the signal mean as an adaptive threshold and enforce a
//! refractory distance between accepted extrema, measured in samples as
//! `ceil(min_distance_s * sampling_rate_hz)`.

use alloc::vec::Vec;

use super::mean;

/// One cardiac cycle: the inclusive sample range between two consecutive valleys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    /// Number of samples covered, both boundary valleys included.
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub const fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Minimum gap between accepted extrema, in samples.
pub fn refractory_samples(min_distance_s: f32, sampling_rate_hz: u16) -> usize {
    let samples = libm::ceilf(min_distance_s * sampling_rate_hz as f32);
    if samples > 0.0 { samples as usize } else { 0 }
}

/// Finds cycle-boundary minima.
///
/// Every run of samples at or below the mean is closed when the signal rises
/// back above it, and the run's first minimum becomes a candidate. A run
/// still open at the end of the signal is not reported. Candidates closer
/// than the refractory distance to the previously kept valley are dropped.
pub fn detect_valleys(signal: &[f32], sampling_rate_hz: u16, min_distance_s: f32) -> Vec<usize> {
    let threshold = mean(signal);
    let min_gap = refractory_samples(min_distance_s, sampling_rate_hz);

    let mut valleys: Vec<usize> = Vec::new();
    let mut open_min: Option<usize> = None;

    for (i, &value) in signal.iter().enumerate() {
        if value <= threshold {
            open_min = match open_min {
                Some(m) if signal[m] <= value => Some(m),
                _ => Some(i),
            };
        } else if let Some(candidate) = open_min.take() {
            let far_enough = valleys
                .last()
                .is_none_or(|&kept| candidate - kept >= min_gap);
            if far_enough {
                valleys.push(candidate);
            }
        }
    }

    valleys
}

/// Finds beat maxima.
///
/// An interior sample is a peak when it exceeds `mean * threshold_factor`,
/// is strictly greater than both neighbours, and lies at least the
/// refractory distance after the last accepted peak. Acceptance is greedy
/// left to right: a larger peak inside the refractory span loses to the
/// earlier one.
pub fn detect_peaks(
    signal: &[f32],
    sampling_rate_hz: u16,
    threshold_factor: f32,
    min_distance_s: f32,
) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();
    if signal.len() < 3 {
        return peaks;
    }

    let threshold = mean(signal) * threshold_factor;
    let min_gap = refractory_samples(min_distance_s, sampling_rate_hz);

    for i in 1..signal.len() - 1 {
        let value = signal[i];
        let is_peak = value > threshold && value > signal[i - 1] && value > signal[i + 1];
        if is_peak && peaks.last().is_none_or(|&last| i - last >= min_gap) {
            peaks.push(i);
        }
    }

    peaks
}

/// Pairs consecutive valleys into cycles.
pub fn pair_valleys(valleys: &[usize]) -> Vec<Segment> {
    valleys
        .windows(2)
        .map(|pair| Segment {
            start: pair[0],
            end: pair[1],
        })
        .collect()
}
