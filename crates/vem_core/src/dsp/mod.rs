//! Signal processing building blocks used by the matchers.
//!
//! - `gcc_phat` - Phase-transform cross-correlation for delay estimation
//! - `spectral` - STFT, mel filterbank, and MFCC extraction
//! - `peaks` - 2-D maximum filter and spectrogram peak picking
//! - `sequence` - DTW distance, Pearson and cosine similarity
//! - `stats` - Robust summary statistics

mod gcc_phat;
mod peaks;
mod sequence;
mod spectral;
mod stats;

pub use gcc_phat::{GccPhat, PhatPeak};
pub use peaks::{find_peaks, maximum_filter, SpectralPeak};
pub use sequence::{cosine_similarity, dtw_distance, pearson};
pub use spectral::{dct_ortho, hann_window, mel_filterbank, MfccExtractor, Stft};
pub use stats::{linspace, mean, median, median_absolute_deviation, rms};
