//! Signal conditioning: bandpass, smoothing and preprocessing helpers

use alloc::vec::Vec;

/// Numerator of the heart-rate bandpass (0.5-4 Hz at 25 Hz).
const BANDPASS_B: [f32; 3] = [0.292893, 0.0, -0.292893];
/// Denominator of the heart-rate bandpass; `a[0]` is normalised to 1.
const BANDPASS_A: [f32; 3] = [1.0, -1.16574, 0.292893];

/// Second-order IIR bandpass over sensor counts.
///
/// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`
///
/// The first two outputs copy the input unchanged because the recursion has
/// no history yet. Callers drop that warm-up with [`trim_edges`].
pub fn bandpass(signal: &[f32]) -> Vec<f32> {
    let [b0, b1, b2] = BANDPASS_B;
    let [_, a1, a2] = BANDPASS_A;

    let mut out: Vec<f32> = Vec::with_capacity(signal.len());
    for (n, &x) in signal.iter().enumerate() {
        let y = if n < 2 {
            x
        } else {
            b0 * x + b1 * signal[n - 1] + b2 * signal[n - 2]
                - a1 * out[n - 1]
                - a2 * out[n - 2]
        };
        out.push(y);
    }
    out
}

/// Trailing moving average.
///
/// Each output averages the current sample and up to `window - 1` preceding
/// ones. Near the start fewer samples exist, and the sum is divided by the
/// number actually present rather than by `window`.
pub fn moving_average(signal: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1);
    (0..signal.len())
        .map(|i| {
            let from = (i + 1).saturating_sub(window);
            let span = &signal[from..=i];
            span.iter().sum::<f32>() / span.len() as f32
        })
        .collect()
}

/// Converts raw counts, filling zero readings (sensor off-skin or
/// disconnected) with the last good value.
///
/// Length and indexing are unchanged. Leading zeros take the first good
/// value; an all-zero buffer stays zero.
pub fn hold_zero_readings(raw: &[u32]) -> Vec<f32> {
    let mut last = raw.iter().copied().find(|&sample| sample != 0).unwrap_or(0);
    raw.iter()
        .map(|&sample| {
            if sample != 0 {
                last = sample;
            }
            last as f32
        })
        .collect()
}

/// Removes `edge` samples from both ends, or everything if the signal is too short.
pub fn trim_edges(signal: &[f32], edge: usize) -> &[f32] {
    if signal.len() <= edge.saturating_mul(2) {
        return &[];
    }
    &signal[edge..signal.len() - edge]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_bandpass_passes_first_two_samples() {
        let out = bandpass(&[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 20.0);
        // 0.292893*30 - 0.292893*10 + 1.16574*20 - 0.292893*10
        assert_close(out[2], 26.24373, 1e-3);
    }

    #[test]
    fn test_bandpass_removes_dc() {
        let raw = vec![50_000.0f32; 200];
        let out = bandpass(&raw);
        assert!(out[199].abs() < 1e-2, "DC leaked through: {}", out[199]);
    }

    #[test]
    fn test_bandpass_empty_and_short() {
        assert!(bandpass(&[]).is_empty());
        assert_eq!(bandpass(&[7.0]), vec![7.0]);
    }

    #[test]
    fn test_moving_average_partial_windows() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out, vec![1.0, 1.5, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_moving_average_zero_window_is_identity() {
        let out = moving_average(&[3.0, -1.0], 0);
        assert_eq!(out, vec![3.0, -1.0]);
    }

    #[test]
    fn test_zero_readings_held_in_place() {
        assert_eq!(
            hold_zero_readings(&[0, 0, 5, 0, 7, 0]),
            vec![5.0, 5.0, 5.0, 5.0, 7.0, 7.0]
        );
        assert_eq!(hold_zero_readings(&[0, 0]), vec![0.0, 0.0]);
        assert!(hold_zero_readings(&[]).is_empty());
    }

    #[test]
    fn test_trim_edges() {
        let signal = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(trim_edges(&signal, 2), &[2.0, 3.0]);
        assert!(trim_edges(&signal, 3).is_empty());
        assert_eq!(trim_edges(&signal, 0).len(), 6);
    }
}
