//! GCC-PHAT (Generalized Cross-Correlation with Phase Transform).
//!
//! The phase-only correlation locates the lag; the reported strength is
//! the plain cross-correlation at that lag normalized by both energies, so
//! it reads as a correlation coefficient in [0, 1].

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, FftPlanner};

/// Delay estimate for one pair of chunks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhatPeak {
    /// Lag in samples at the correlation peak.
    pub lag_samples: isize,
    /// Normalized cross-correlation at the lag (0-1).
    pub correlation: f64,
}

/// GCC-PHAT correlator with a cached FFT planner.
pub struct GccPhat {
    planner: Mutex<FftPlanner<f64>>,
}

impl GccPhat {
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Find the strongest lag within `max_lag` samples either way.
    ///
    /// Returns `None` for empty input.
    pub fn estimate(&self, reference: &[f32], other: &[f32], max_lag: usize) -> Option<PhatPeak> {
        if reference.is_empty() || other.is_empty() {
            return None;
        }

        let reference = zero_mean(reference);
        let other = zero_mean(other);

        let fft_len = (reference.len() + other.len() - 1).next_power_of_two();
        let (fft, ifft) = {
            let mut planner = self.planner.lock();
            (
                planner.plan_fft_forward(fft_len),
                planner.plan_fft_inverse(fft_len),
            )
        };

        let mut ref_fft = padded(&reference, fft_len);
        let mut other_fft = padded(&other, fft_len);
        fft.process(&mut ref_fft);
        fft.process(&mut other_fft);

        // Cross-power spectrum: R * conj(T)
        let mut cross: Vec<Complex<f64>> = ref_fft
            .iter()
            .zip(other_fft.iter())
            .map(|(r, t)| *r * t.conj())
            .collect();

        // PHAT weighting keeps phase only
        let mut phat: Vec<Complex<f64>> = cross
            .iter()
            .map(|c| {
                let mag = c.norm();
                if mag > 1e-9 {
                    *c / mag
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        ifft.process(&mut phat);
        ifft.process(&mut cross);

        // Zero lag at index 0, negative lags wrap around from the end
        let max_lag = max_lag.min((fft_len / 2).saturating_sub(1)) as isize;
        let index_of = |lag: isize| -> usize {
            if lag < 0 {
                (fft_len as isize + lag) as usize
            } else {
                lag as usize
            }
        };

        let mut best_lag = 0isize;
        let mut best_value = f64::NEG_INFINITY;
        for lag in -max_lag..=max_lag {
            let value = phat[index_of(lag)].re.abs();
            if value > best_value {
                best_value = value;
                best_lag = lag;
            }
        }

        let energy = (sum_of_squares(&reference) * sum_of_squares(&other)).sqrt();
        let correlation = if energy > 0.0 {
            let raw = cross[index_of(best_lag)].re / fft_len as f64;
            (raw.abs() / (energy + 1e-12)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(PhatPeak {
            lag_samples: best_lag,
            correlation,
        })
    }
}

impl Default for GccPhat {
    fn default() -> Self {
        Self::new()
    }
}

fn zero_mean(samples: &[f32]) -> Vec<f64> {
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    samples.iter().map(|&s| s as f64 - mean).collect()
}

fn padded(samples: &[f64], len: usize) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(len, Complex::new(0.0, 0.0));
    buffer
}

fn sum_of_squares(samples: &[f64]) -> f64 {
    samples.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic white-ish noise.
    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) as f32
            })
            .collect()
    }

    #[test]
    fn identical_chunks_correlate_fully() {
        let signal = noise(4096, 7);
        let peak = GccPhat::new().estimate(&signal, &signal, 100).unwrap();
        assert_eq!(peak.lag_samples, 0);
        assert!(peak.correlation > 0.999, "got {}", peak.correlation);
    }

    #[test]
    fn detects_shift() {
        let base = noise(8192, 11);
        let shift = 25;
        // `other` starts `shift` samples later in the same signal
        let reference = &base[shift..shift + 4096];
        let other = &base[..4096];

        let peak = GccPhat::new().estimate(reference, other, 100).unwrap();
        assert_eq!(peak.lag_samples.unsigned_abs(), shift);
        assert!(peak.correlation > 0.9, "got {}", peak.correlation);
    }

    #[test]
    fn unrelated_noise_scores_low() {
        let a = noise(4096, 1);
        let b = noise(4096, 2);
        let peak = GccPhat::new().estimate(&a, &b, 100).unwrap();
        assert!(peak.correlation < 0.2, "got {}", peak.correlation);
    }

    #[test]
    fn silence_scores_zero() {
        let silence = vec![0.0f32; 1024];
        let peak = GccPhat::new().estimate(&silence, &silence, 10).unwrap();
        assert_eq!(peak.correlation, 0.0);
    }

    #[test]
    fn single_samples_give_zero_lag() {
        let peak = GccPhat::new().estimate(&[0.5], &[0.25], 10).unwrap();
        assert_eq!(peak.lag_samples, 0);
        assert_eq!(peak.correlation, 0.0);
    }

    #[test]
    fn empty_input_is_none() {
        assert!(GccPhat::new().estimate(&[], &[1.0], 10).is_none());
    }
}
