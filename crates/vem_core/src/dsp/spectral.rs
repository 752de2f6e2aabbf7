//! Short-time spectra and MFCC features.
//!
//! Mel scale, Slaney-normalized filterbank, and ortho DCT follow the usual
//! librosa conventions closely enough for similarity scoring.

use std::f64::consts::PI;

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, FftPlanner};

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// Short-time Fourier transform without centering: frames start at
/// multiples of `hop_length` and must fit entirely inside the input.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f64>,
    planner: Mutex<FftPlanner<f64>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        Self {
            n_fft,
            hop_length: hop_length.max(1),
            window: hann_window(n_fft),
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Frequency bins per frame (`n_fft / 2 + 1`).
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn frame_count(&self, len: usize) -> usize {
        if len < self.n_fft || self.n_fft == 0 {
            0
        } else {
            (len - self.n_fft) / self.hop_length + 1
        }
    }

    /// Magnitude spectrogram as `[frame][bin]`.
    pub fn magnitude(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        self.transform(samples, |c| c.norm())
    }

    /// Power spectrogram as `[frame][bin]`.
    pub fn power(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        self.transform(samples, |c| c.norm_sqr())
    }

    fn transform(&self, samples: &[f32], value: impl Fn(&Complex<f64>) -> f64) -> Vec<Vec<f64>> {
        let num_frames = self.frame_count(samples.len());
        if num_frames == 0 {
            return Vec::new();
        }

        let fft = self.planner.lock().plan_fft_forward(self.n_fft);
        let num_bins = self.n_bins();

        let mut spectrogram = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.n_fft];

        for frame in 0..num_frames {
            let start = frame * self.hop_length;
            for ((slot, &sample), &w) in buffer
                .iter_mut()
                .zip(&samples[start..start + self.n_fft])
                .zip(&self.window)
            {
                *slot = Complex::new(sample as f64 * w, 0.0);
            }

            fft.process(&mut buffer);
            spectrogram.push(buffer[..num_bins].iter().map(&value).collect());
        }

        spectrogram
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Triangular mel filterbank of shape `[n_mels][n_fft / 2 + 1]`.
pub fn mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: u32) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);

    let hz_points: Vec<f64> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_points: Vec<f64> = hz_points
        .iter()
        .map(|&hz| hz * n_fft as f64 / sample_rate as f64)
        .collect();

    let mut filterbank = vec![vec![0.0; n_bins]; n_mels];

    for (i, filter) in filterbank.iter_mut().enumerate() {
        let (start, center, end) = (bin_points[i], bin_points[i + 1], bin_points[i + 2]);

        for (j, weight) in filter.iter_mut().enumerate() {
            let bin = j as f64;
            if bin >= start && bin < center {
                *weight = (bin - start) / (center - start);
            } else if bin >= center && bin <= end && end > center {
                *weight = (end - bin) / (end - center);
            }
        }

        // Slaney normalization: 2 / bandwidth in Hz
        let bandwidth = hz_points[i + 2] - hz_points[i];
        if bandwidth > 0.0 {
            let norm = 2.0 / bandwidth;
            filter.iter_mut().for_each(|w| *w *= norm);
        }
    }

    filterbank
}

/// DCT-II with orthonormal scaling, keeping the first `n_coeffs` terms.
pub fn dct_ortho(input: &[f64], n_coeffs: usize) -> Vec<f64> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_coeffs];
    }

    (0..n_coeffs)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos())
                .sum();
            let scale = if k == 0 {
                (1.0 / n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
            };
            sum * scale
        })
        .collect()
}

/// MFCC extractor (n_fft 2048, hop 512, 128 mel bands, 80 dB floor).
pub struct MfccExtractor {
    stft: Stft,
    n_mels: usize,
    n_mfcc: usize,
    top_db: f64,
}

impl MfccExtractor {
    pub fn new(n_mfcc: usize) -> Self {
        Self {
            stft: Stft::new(2048, 512),
            n_mels: 128,
            n_mfcc,
            top_db: 80.0,
        }
    }

    /// Per-frame coefficients as `[frame][coefficient]`.
    pub fn compute(&self, samples: &[f32], sample_rate: u32) -> Vec<Vec<f64>> {
        let power = self.stft.power(samples);
        if power.is_empty() {
            return Vec::new();
        }

        let filterbank = mel_filterbank(self.n_mels, self.stft.n_fft(), sample_rate);

        let mut log_mel: Vec<Vec<f64>> = power
            .iter()
            .map(|frame| {
                filterbank
                    .iter()
                    .map(|filter| {
                        let energy: f64 = frame.iter().zip(filter).map(|(p, w)| p * w).sum();
                        10.0 * energy.max(1e-10).log10()
                    })
                    .collect()
            })
            .collect();

        // Clamp to top_db below the loudest band
        let peak = log_mel
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let floor = peak - self.top_db;
        for value in log_mel.iter_mut().flatten() {
            *value = value.max(floor);
        }

        log_mel
            .iter()
            .map(|frame| dct_ortho(frame, self.n_mfcc))
            .collect()
    }

    /// Mean coefficient vector over all frames, `None` if the input is
    /// shorter than one frame.
    pub fn mean(&self, samples: &[f32], sample_rate: u32) -> Option<Vec<f64>> {
        let frames = self.compute(samples, sample_rate);
        if frames.is_empty() {
            return None;
        }

        let mut mean = vec![0.0; self.n_mfcc];
        for frame in &frames {
            for (acc, &c) in mean.iter_mut().zip(frame) {
                *acc += c;
            }
        }
        let count = frames.len() as f64;
        mean.iter_mut().for_each(|v| *v /= count);
        Some(mean)
    }
}
