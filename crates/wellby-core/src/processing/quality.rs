//! Per-cycle signal quality and noise rejection
//!
//! Each valley-to-valley segment is summarised by its standard deviation,
//! excess kurtosis and skewness. Segments whose statistics stray too far from
//! the recording-wide means (motion artefacts, loose fit) are dropped before
//! peak detection.

use alloc::vec::Vec;

use log::debug;
use serde::{Deserialize, Serialize};

use super::Segment;

/// Offsets added to the mean segment statistics to form the rejection thresholds.
///
/// Units follow the conditioned signal for `std_high`; the remaining
/// offsets are dimensionless.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoiseOffsets {
    pub std_high: f32,
    pub kurtosis_high: f32,
    pub skew_low: f32,
    pub skew_high: f32,
}

impl NoiseOffsets {
    /// Build from `[std_high, kurtosis_high, skew_low, skew_high]`.
    pub const fn from_array(offsets: [f32; 4]) -> Self {
        Self {
            std_high: offsets[0],
            kurtosis_high: offsets[1],
            skew_low: offsets[2],
            skew_high: offsets[3],
        }
    }
}

impl Default for NoiseOffsets {
    fn default() -> Self {
        Self::from_array([25.0, 1.0, 0.75, 0.75])
    }
}

/// Moments of one segment, over population (divide-by-N) statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats {
    pub segment: Segment,
    pub mean: f32,
    pub std_dev: f32,
    /// Excess kurtosis, `m4 / var^2 - 3`
    pub kurtosis: f32,
    pub skewness: f32,
}

/// Computes the statistics of `segment` over `signal`.
///
/// Returns `None` when the segment falls outside the signal or has zero
/// variance, where kurtosis and skewness are undefined.
pub fn segment_statistics(signal: &[f32], segment: Segment) -> Option<SegmentStats> {
    if segment.is_empty() || segment.end >= signal.len() {
        return None;
    }
    let samples = &signal[segment.start..=segment.end];
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;

    let (mut m2, mut m3, mut m4) = (0.0f32, 0.0f32, 0.0f32);
    for &x in samples {
        let d = x - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    let variance = m2 / n;
    if variance <= f32::EPSILON {
        return None;
    }
    let std_dev = libm::sqrtf(variance);

    Some(SegmentStats {
        segment,
        mean,
        std_dev,
        kurtosis: (m4 / n) / (variance * variance) - 3.0,
        skewness: (m3 / n) / (std_dev * std_dev * std_dev),
    })
}

/// Acceptance bounds derived from one recording's segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub std_high: f32,
    pub kurtosis_high: f32,
    pub skew_low: f32,
    pub skew_high: f32,
}

impl QualityThresholds {
    /// Thresholds around the mean statistics, `None` without any segments.
    pub fn from_statistics(stats: &[SegmentStats], offsets: &NoiseOffsets) -> Option<Self> {
        if stats.is_empty() {
            return None;
        }
        let n = stats.len() as f32;
        let mean_std = stats.iter().map(|s| s.std_dev).sum::<f32>() / n;
        let mean_kurtosis = stats.iter().map(|s| s.kurtosis).sum::<f32>() / n;
        let mean_skew = stats.iter().map(|s| s.skewness).sum::<f32>() / n;

        Some(Self {
            std_high: mean_std + offsets.std_high,
            kurtosis_high: mean_kurtosis + offsets.kurtosis_high,
            skew_low: mean_skew - offsets.skew_low,
            skew_high: mean_skew + offsets.skew_high,
        })
    }

    pub fn accepts(&self, stats: &SegmentStats) -> bool {
        stats.std_dev < self.std_high
            && stats.kurtosis < self.kurtosis_high
            && stats.skewness > self.skew_low
            && stats.skewness < self.skew_high
    }
}

/// Signal rebuilt from the segments that passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    pub signal: Vec<f32>,
    pub kept: Vec<Segment>,
    /// Segments dropped for their statistics or for zero variance
    pub rejected: usize,
}

/// Drops noisy segments and concatenates the rest in original order.
///
/// Segments are copied whole, boundaries included, so a valley shared by two
/// kept neighbours appears twice in the output.
pub fn eliminate_noise(
    signal: &[f32],
    segments: &[Segment],
    offsets: &NoiseOffsets,
) -> QualityReport {
    let stats: Vec<SegmentStats> = segments
        .iter()
        .filter_map(|&segment| segment_statistics(signal, segment))
        .collect();

    let mut report = QualityReport {
        rejected: segments.len() - stats.len(),
        ..QualityReport::default()
    };

    let Some(thresholds) = QualityThresholds::from_statistics(&stats, offsets) else {
        return report;
    };
    debug!("Segment quality thresholds: {thresholds:?}");

    for s in &stats {
        if !thresholds.accepts(s) {
            report.rejected += 1;
            continue;
        }
        let Segment { start, end } = s.segment;
        report.signal.extend_from_slice(&signal[start..=end]);
        report.kept.push(s.segment);
    }

    report
}
