//! RR intervals and time-domain HRV metrics

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

/// Shortest physiologically plausible beat-to-beat interval (200 bpm).
pub const MIN_RR_MS: u32 = 300;
/// Longest physiologically plausible beat-to-beat interval (40 bpm).
pub const MAX_RR_MS: u32 = 1500;

/// Converts peak sample indices to RR intervals in whole milliseconds.
///
/// Intervals outside `[MIN_RR_MS, MAX_RR_MS]` are dropped (missed or extra
/// beats). Fewer than two peaks yields no intervals.
pub fn rr_intervals(peaks: &[usize], sampling_rate_hz: u16) -> Vec<u32> {
    if sampling_rate_hz == 0 {
        return Vec::new();
    }
    peaks
        .windows(2)
        .filter_map(|pair| pair[1].checked_sub(pair[0]))
        .map(|samples| samples as u64 * 1000 / sampling_rate_hz as u64)
        .filter(|&ms| (MIN_RR_MS as u64..=MAX_RR_MS as u64).contains(&ms))
        .map(|ms| ms as u32)
        .collect()
}

/// Time-domain HRV summary of one recording.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HrvMetrics {
    /// Mean heart rate, `60000 / mean RR`
    pub heart_rate_bpm: f32,
    /// Population standard deviation of the RR intervals
    pub sdnn_ms: f32,
    /// Root mean square of successive differences, the mean taken over the
    /// `n - 1` successive differences. Needs at least two intervals.
    pub rmssd_ms: Option<f32>,
    pub rr_count: u16,
}

impl HrvMetrics {
    /// Metrics over `rr` (milliseconds), `None` when there are no intervals.
    pub fn from_rr(rr: &[u32]) -> Option<Self> {
        if rr.is_empty() {
            return None;
        }
        let n = rr.len() as f32;
        let mean_rr = rr.iter().map(|&v| v as f32).sum::<f32>() / n;
        if mean_rr <= 0.0 {
            return None;
        }

        let variance = rr
            .iter()
            .map(|&v| {
                let d = v as f32 - mean_rr;
                d * d
            })
            .sum::<f32>()
            / n;

        let rmssd_ms = (rr.len() >= 2).then(|| {
            let sum_sq = rr
                .windows(2)
                .map(|pair| {
                    let d = pair[1] as f32 - pair[0] as f32;
                    d * d
                })
                .sum::<f32>();
            libm::sqrtf(sum_sq / (n - 1.0))
        });

        Some(Self {
            heart_rate_bpm: 60_000.0 / mean_rr,
            sdnn_ms: libm::sqrtf(variance),
            rmssd_ms,
            rr_count: rr.len().min(u16::MAX as usize) as u16,
        })
    }
}

/// Beat-regularity score: spread of the RR intervals in milliseconds.
///
/// Same measure as SDNN but refuses to score a single interval, so callers
/// can tell "perfectly regular" from "not enough beats".
pub fn rr_consistency(rr: &[u32]) -> Option<f32> {
    if rr.len() < 2 {
        return None;
    }
    HrvMetrics::from_rr(rr).map(|metrics| metrics.sdnn_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_rr_intervals_in_range() {
        assert_eq!(rr_intervals(&[0, 50, 100, 260], 100), vec![500, 500]);
    }

    #[test]
    fn test_rr_intervals_out_of_range_at_low_rate() {
        // 2000 ms, 2000 ms, 6400 ms at 25 Hz
        assert!(rr_intervals(&[0, 50, 100, 260], 25).is_empty());
    }

    #[test]
    fn test_rr_interval_bounds_inclusive() {
        // 30 samples at 100 Hz = 300 ms, 150 samples = 1500 ms
        assert_eq!(rr_intervals(&[0, 30, 180], 100), vec![300, 1500]);
        assert!(rr_intervals(&[0, 29], 100).is_empty());
    }

    #[test]
    fn test_rr_intervals_truncate() {
        // 21 samples at 25 Hz = 840 ms, 19 samples = 760 ms
        assert_eq!(rr_intervals(&[3, 24, 43], 25), vec![840, 760]);
    }

    #[test]
    fn test_rr_intervals_degenerate() {
        assert!(rr_intervals(&[], 25).is_empty());
        assert!(rr_intervals(&[10], 25).is_empty());
        assert!(rr_intervals(&[0, 20], 0).is_empty());
    }

    #[test]
    fn test_metrics_reference_values() {
        let metrics = HrvMetrics::from_rr(&[800, 820, 780]).unwrap();
        assert!((metrics.heart_rate_bpm - 75.0).abs() < 0.01);
        assert!((metrics.sdnn_ms - 16.33).abs() < 0.01);
        assert!((metrics.rmssd_ms.unwrap() - 31.62).abs() < 0.01);
        assert_eq!(metrics.rr_count, 3);
    }

    #[test]
    fn test_metrics_single_interval() {
        let metrics = HrvMetrics::from_rr(&[1000]).unwrap();
        assert_eq!(metrics.heart_rate_bpm, 60.0);
        assert_eq!(metrics.sdnn_ms, 0.0);
        assert_eq!(metrics.rmssd_ms, None);
    }

    #[test]
    fn test_metrics_empty() {
        assert_eq!(HrvMetrics::from_rr(&[]), None);
    }

    #[test]
    fn test_rr_consistency() {
        assert_eq!(rr_consistency(&[800, 800, 800]), Some(0.0));
        assert!((rr_consistency(&[800, 820, 780]).unwrap() - 16.33).abs() < 0.01);
        assert_eq!(rr_consistency(&[800]), None);
    }
}
