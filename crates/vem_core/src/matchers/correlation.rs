//! Chunked GCC-PHAT correlation on full-length audio.
//!
//! Both files are decoded in full at the correlation sample rate. Chunks
//! spread across 10%-90% of the shorter buffer are correlated pairwise;
//! the score is the mean correlation of the chunks that clear the quality
//! bars, halved when their delays disagree.

use std::path::Path;

use super::{Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::config::CorrelationSettings;
use crate::dsp::{linspace, mean, median, median_absolute_deviation, rms, GccPhat};
use crate::error::MatchResult;
use crate::media::{AudioSamples, AudioWindow};

pub struct CorrelationMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
    gcc: GccPhat,
}

impl CorrelationMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self {
            ctx,
            flag,
            gcc: GccPhat::new(),
        }
    }

    fn try_compare(
        &self,
        reference: &Path,
        remux: &Path,
        language: Option<&str>,
    ) -> MatchResult<ScoreResult> {
        let settings = &self.ctx.settings.correlation;

        let ref_stream = self.ctx.audio_stream_index(reference, language)?;
        let remux_stream = self.ctx.audio_stream_index(remux, language)?;

        let ref_audio =
            self.ctx
                .audio(reference, ref_stream, settings.sample_rate, AudioWindow::FULL)?;
        let remux_audio =
            self.ctx
                .audio(remux, remux_stream, settings.sample_rate, AudioWindow::FULL)?;

        Ok(chunked_correlation(
            &ref_audio,
            &remux_audio,
            settings,
            &self.gcc,
            &self.flag,
        ))
    }
}

impl Matcher for CorrelationMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Correlation
    }

    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult {
        self.try_compare(reference, remux, language)
            .unwrap_or_else(|err| {
                tracing::debug!(
                    "Correlation of {} vs {} failed: {}",
                    reference.display(),
                    remux.display(),
                    err
                );
                ScoreResult::from(err)
            })
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

/// Score two aligned-at-zero buffers chunk by chunk.
pub fn chunked_correlation(
    reference: &AudioSamples,
    remux: &AudioSamples,
    settings: &CorrelationSettings,
    gcc: &GccPhat,
    flag: &RunFlag,
) -> ScoreResult {
    let rate = reference.sample_rate as f64;
    let shorter = reference.len().min(remux.len());
    let duration = shorter as f64 / rate;

    let chunk_len = (settings.chunk_duration_secs * rate) as usize;
    let max_lag = (settings.max_lag_ms / 1000.0 * rate) as usize;
    let total = settings.chunk_count;

    let mut correlations = Vec::with_capacity(total);
    let mut delays_ms = Vec::with_capacity(total);

    for start_secs in linspace(duration * 0.1, duration * 0.9, total) {
        if !flag.is_running() {
            break;
        }

        let start = (start_secs * rate) as usize;
        let end = start + chunk_len;
        if chunk_len == 0 || end > reference.len() || end > remux.len() {
            continue;
        }

        let ref_chunk = &reference.samples[start..end];
        let remux_chunk = &remux.samples[start..end];

        if rms(ref_chunk) < settings.rms_threshold || rms(remux_chunk) < settings.rms_threshold {
            tracing::trace!("Chunk at {:.1}s is too quiet", start_secs);
            continue;
        }

        let Some(peak) = gcc.estimate(ref_chunk, remux_chunk, max_lag) else {
            continue;
        };

        if peak.correlation > settings.min_chunk_correlation {
            correlations.push(peak.correlation);
            delays_ms.push(peak.lag_samples as f64 / rate * 1000.0);
        }
    }

    let valid = correlations.len();
    if valid < settings.min_valid_chunks || valid == 0 {
        return ScoreResult::no_evidence(format!("Only {valid}/{total} valid chunks"));
    }

    let mean_correlation = mean(&correlations).unwrap_or(0.0);
    let delay = median(&delays_ms).unwrap_or(0.0);
    let mad = median_absolute_deviation(&delays_ms).unwrap_or(0.0);

    if mad > settings.max_delay_mad_ms {
        ScoreResult::new(
            mean_correlation * 0.5,
            format!("Inconsistent delays (MAD={mad:.0}ms)"),
        )
    } else {
        ScoreResult::new(
            mean_correlation,
            format!("Delay={delay:.0}ms, {valid}/{total} chunks"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 4000;

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

    fn test_settings() -> CorrelationSettings {
        CorrelationSettings {
            sample_rate: RATE,
            chunk_duration_secs: 1.0,
            ..CorrelationSettings::default()
        }
    }

    fn audio(samples: Vec<f32>) -> AudioSamples {
        AudioSamples::new(samples, RATE)
    }

    #[test]
    fn identical_audio_scores_high() {
        let signal = audio(noise(60 * RATE as usize, 3));
        let result = chunked_correlation(
            &signal,
            &signal,
            &test_settings(),
            &GccPhat::new(),
            &RunFlag::new(),
        );
        assert!(result.confidence > 0.99, "{result:?}");
        assert_eq!(result.info, "Delay=0ms, 10/10 chunks");
    }

    #[test]
    fn shifted_audio_reports_delay() {
        let base = noise(61 * RATE as usize, 5);
        // 40 samples at 4 kHz = 10 ms
        let reference = audio(base[40..].to_vec());
        let remux = audio(base.clone());

        let result = chunked_correlation(
            &reference,
            &remux,
            &test_settings(),
            &GccPhat::new(),
            &RunFlag::new(),
        );
        assert!(result.confidence > 0.9, "{result:?}");
        assert!(result.info.contains("10ms"), "{}", result.info);
    }

    #[test]
    fn unrelated_audio_has_no_valid_chunks() {
        let a = audio(noise(60 * RATE as usize, 1));
        let b = audio(noise(60 * RATE as usize, 2));
        let result =
            chunked_correlation(&a, &b, &test_settings(), &GccPhat::new(), &RunFlag::new());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.info, "Only 0/10 valid chunks");
    }

    #[test]
    fn silence_is_skipped() {
        let silent = audio(vec![0.0; 60 * RATE as usize]);
        let result = chunked_correlation(
            &silent,
            &silent,
            &test_settings(),
            &GccPhat::new(),
            &RunFlag::new(),
        );
        assert_eq!(result.confidence, 0.0);
        assert!(result.info.starts_with("Only 0/10"));
    }

    #[test]
    fn stopped_flag_short_circuits() {
        let signal = audio(noise(60 * RATE as usize, 3));
        let flag = RunFlag::new();
        flag.stop();
        let result = chunked_correlation(&signal, &signal, &test_settings(), &GccPhat::new(), &flag);
        assert_eq!(result.confidence, 0.0);
    }
}
