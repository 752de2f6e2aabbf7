//! Local-maximum peak picking on spectrograms.

use super::stats::median;

/// A spectrogram peak at (frame, bin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpectralPeak {
    pub time: usize,
    pub freq: usize,
}

impl SpectralPeak {
    pub fn new(time: usize, freq: usize) -> Self {
        Self { time, freq }
    }
}

/// Rectangular `size` x `size` maximum filter over a `[row][col]` grid.
///
/// The window covers `i - size/2 ..= i + (size - 1) - size/2` on each axis
/// and is clipped at the edges, which equals zero padding for
/// non-negative input.
pub fn maximum_filter(data: &[Vec<f64>], size: usize) -> Vec<Vec<f64>> {
    if data.is_empty() || size <= 1 {
        return data.to_vec();
    }

    let before = size / 2;
    let after = size - 1 - before;

    // Max is separable: filter along columns within each row, then across rows
    let rows: Vec<Vec<f64>> = data
        .iter()
        .map(|row| sliding_max(row, before, after))
        .collect();

    let n_rows = rows.len();
    let n_cols = rows[0].len();
    let mut output = vec![vec![0.0; n_cols]; n_rows];
    for (r, out_row) in output.iter_mut().enumerate() {
        let lo = r.saturating_sub(before);
        let hi = (r + after).min(n_rows - 1);
        for (c, out) in out_row.iter_mut().enumerate() {
            *out = rows[lo..=hi]
                .iter()
                .map(|row| row[c])
                .fold(f64::NEG_INFINITY, f64::max);
        }
    }

    output
}

fn sliding_max(values: &[f64], before: usize, after: usize) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(n - 1);
            values[lo..=hi].iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

/// Points that equal their neighbourhood maximum and exceed
/// `median_factor` times the spectrogram median.
///
/// `spectrogram` is `[frame][bin]`. Peaks are returned ordered by bin,
/// then frame.
pub fn find_peaks(spectrogram: &[Vec<f64>], size: usize, median_factor: f64) -> Vec<SpectralPeak> {
    if spectrogram.is_empty() || spectrogram[0].is_empty() {
        return Vec::new();
    }

    let local_max = maximum_filter(spectrogram, size);
    let all: Vec<f64> = spectrogram.iter().flatten().copied().collect();
    let threshold = median(&all).unwrap_or(0.0) * median_factor;

    let n_bins = spectrogram[0].len();
    let mut peaks = Vec::new();
    for freq in 0..n_bins {
        for (time, frame) in spectrogram.iter().enumerate() {
            let value = frame[freq];
            if value == local_max[time][freq] && value > threshold {
                peaks.push(SpectralPeak::new(time, freq));
            }
        }
    }

    peaks
}
