//! Command-line media backend built on ffprobe, ffmpeg, fpcalc, and Java.
//!
//! Every invocation runs under the matching timeout from `ToolSettings`;
//! a process that overruns is killed and reported as `MediaError::Timeout`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use image::RgbImage;
use serde::Deserialize;

use super::backend::{MediaBackend, MediaError, MediaResult};
use super::panako::{parse_panako_output, PanakoMatch};
use super::process::{check_success, kill_quietly, run_with_timeout, spawn_error};
use super::types::{AudioSamples, AudioWindow, CodecType, StreamDescriptor};
use crate::config::ToolSettings;

/// Sample rate fed to fpcalc.
const CHROMAPRINT_SAMPLE_RATE: u32 = 16000;

/// Longest stretch of audio fingerprinted by fpcalc (seconds).
const CHROMAPRINT_MAX_SECS: u32 = 120;

/// ffprobe `-show_streams` output.
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl ProbeStream {
    fn tag(&self, name: &str) -> Option<String> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn into_descriptor(self) -> StreamDescriptor {
        let codec_type = self
            .codec_type
            .as_deref()
            .map(CodecType::from_probe)
            .unwrap_or(CodecType::Other);
        StreamDescriptor {
            index: self.index,
            codec_type,
            language: self.tag("language"),
            title: self.tag("title"),
        }
    }
}

/// Production backend that shells out to the configured tools.
#[derive(Debug, Clone)]
pub struct CommandLineBackend {
    tools: ToolSettings,
}

impl CommandLineBackend {
    pub fn new(tools: ToolSettings) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.arg("-nostdin").arg("-hide_banner").stdin(Stdio::null());
        cmd
    }

    fn ffprobe(&self) -> Command {
        let mut cmd = Command::new(&self.tools.ffprobe);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn panako(&self, workspace: &Path, action: &str, wav: &Path) -> MediaResult<String> {
        let jar = self
            .tools
            .panako_jar_path()
            .filter(|jar| jar.exists())
            .ok_or_else(|| MediaError::unavailable("Panako"))?;

        let mut cmd = Command::new(&self.tools.java);
        cmd.arg(format!("-Duser.home={}", workspace.display()))
            .arg("--add-opens=java.base/java.nio=ALL-UNNAMED")
            .arg("-jar")
            .arg(&jar)
            .arg(action)
            .arg("STRATEGY=panako")
            .arg(wav)
            .current_dir(workspace)
            .stdin(Stdio::null());

        let output = run_with_timeout("java", &mut cmd, secs(self.tools.panako_timeout_secs))?;
        let output = check_success("panako", output)?;
        Ok(output.stdout_lossy())
    }
}

impl MediaBackend for CommandLineBackend {
    fn probe_streams(&self, path: &Path) -> MediaResult<Vec<StreamDescriptor>> {
        let mut cmd = self.ffprobe();
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path);

        let output = run_with_timeout("ffprobe", &mut cmd, secs(self.tools.probe_timeout_secs))?;
        let output = check_success("ffprobe", output)?;

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::parse("ffprobe stream list", e.to_string()))?;

        let streams: Vec<StreamDescriptor> = probe
            .streams
            .into_iter()
            .map(ProbeStream::into_descriptor)
            .collect();

        tracing::debug!("Found {} streams in {}", streams.len(), path.display());
        Ok(streams)
    }

    fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let mut cmd = self.ffprobe();
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);

        let output = run_with_timeout("ffprobe", &mut cmd, secs(self.tools.probe_timeout_secs))?;
        let output = check_success("ffprobe", output)?;

        let text = output.stdout_lossy();
        let duration: f64 = text
            .trim()
            .parse()
            .map_err(|_| MediaError::parse("duration", format!("'{}'", text.trim())))?;

        if duration > 0.0 && duration.is_finite() {
            Ok(duration)
        } else {
            Err(MediaError::parse("duration", format!("non-positive value {duration}")))
        }
    }

    fn decode_audio(
        &self,
        path: &Path,
        stream_index: usize,
        sample_rate: u32,
        window: AudioWindow,
    ) -> MediaResult<AudioSamples> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-v", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", window.start_secs()))
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(sample_rate.to_string());
        if let Some(duration) = window.duration_secs() {
            cmd.arg("-t").arg(format!("{duration:.3}"));
        }
        cmd.args(["-f", "f32le", "-"]);

        let output = run_with_timeout("ffmpeg", &mut cmd, secs(self.tools.decode_timeout_secs))?;
        let output = check_success("ffmpeg", output)?;

        let samples = bytes_to_f32_samples(&output.stdout);
        if samples.is_empty() {
            return Err(MediaError::DecodeFailure(format!(
                "no audio samples decoded from {}",
                path.display()
            )));
        }

        tracing::debug!(
            "Decoded {} samples ({:.1}s) from {} stream {}",
            samples.len(),
            samples.len() as f64 / sample_rate as f64,
            path.display(),
            stream_index
        );

        Ok(AudioSamples::new(samples, sample_rate))
    }

    fn decode_audio_to_file(
        &self,
        path: &Path,
        stream_index: usize,
        sample_rate: u32,
        output: &Path,
    ) -> MediaResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-y", "-v", "error", "-i"])
            .arg(path)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg(output);

        let result = run_with_timeout("ffmpeg", &mut cmd, secs(self.tools.decode_timeout_secs))?;
        check_success("ffmpeg", result)?;

        if !output.exists() {
            return Err(MediaError::DecodeFailure(format!(
                "ffmpeg produced no file at {}",
                output.display()
            )));
        }
        Ok(())
    }

    fn decode_frames(&self, path: &Path, timestamps: &[f64]) -> MediaResult<Vec<RgbImage>> {
        let mut frames = Vec::with_capacity(timestamps.len());

        for &timestamp in timestamps {
            match self.decode_frame(path, timestamp) {
                Ok(frame) => frames.push(frame),
                // A missing binary won't fix itself on the next timestamp
                Err(err @ MediaError::ToolUnavailable { .. }) => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        "Skipping frame at {:.2}s of {}: {}",
                        timestamp,
                        path.display(),
                        err
                    );
                }
            }
        }

        Ok(frames)
    }

    fn extract_chromaprint(
        &self,
        path: &Path,
        stream_index: usize,
        window: AudioWindow,
    ) -> MediaResult<String> {
        let length = window
            .duration_secs()
            .unwrap_or(CHROMAPRINT_MAX_SECS as f64)
            .min(CHROMAPRINT_MAX_SECS as f64);

        // ffmpeg decodes the chosen stream to raw PCM piped into fpcalc
        let mut decoder = self.ffmpeg();
        decoder
            .args(["-v", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", window.start_secs()))
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(CHROMAPRINT_SAMPLE_RATE.to_string())
            .arg("-t")
            .arg(format!("{length:.3}"))
            .args(["-f", "s16le", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        tracing::debug!("Running ffmpeg: {:?}", decoder);
        let mut decoder = decoder.spawn().map_err(|e| spawn_error("ffmpeg", e))?;
        let pcm = decoder
            .stdout
            .take()
            .ok_or_else(|| MediaError::DecodeFailure("failed to capture ffmpeg stdout".into()))?;

        let mut fpcalc = Command::new(&self.tools.fpcalc);
        fpcalc
            .args(["-raw", "-format", "s16le"])
            .arg("-rate")
            .arg(CHROMAPRINT_SAMPLE_RATE.to_string())
            .args(["-channels", "1"])
            .arg("-length")
            .arg(CHROMAPRINT_MAX_SECS.to_string())
            .arg("-")
            .stdin(Stdio::from(pcm));

        let result = run_with_timeout(
            "fpcalc",
            &mut fpcalc,
            secs(self.tools.fingerprint_timeout_secs),
        );
        kill_quietly(&mut decoder);

        let output = check_success("fpcalc", result?)?;
        parse_fpcalc_output(&output.stdout_lossy())
            .ok_or_else(|| MediaError::parse("fpcalc output", "no FINGERPRINT line"))
    }

    fn detect_scene_cuts(&self, path: &Path, threshold: f64) -> MediaResult<Vec<f64>> {
        let filter = format!(
            "select='gt(scene,{:.3})',showinfo",
            (threshold / 100.0).clamp(0.0, 1.0)
        );

        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(path)
            .args(["-an", "-sn", "-vf"])
            .arg(filter)
            .args(["-f", "null", "-"]);

        let output = run_with_timeout("ffmpeg", &mut cmd, secs(self.tools.scene_timeout_secs))?;
        let output = check_success("ffmpeg", output)?;

        let cuts = parse_scene_cuts(&output.stderr_lossy());
        tracing::debug!("Detected {} scene cuts in {}", cuts.len(), path.display());
        Ok(cuts)
    }

    fn panako_store(&self, workspace: &Path, wav: &Path) -> MediaResult<()> {
        self.panako(workspace, "store", wav)?;
        Ok(())
    }

    fn panako_query(&self, workspace: &Path, wav: &Path) -> MediaResult<Option<PanakoMatch>> {
        let stdout = self.panako(workspace, "query", wav)?;
        Ok(parse_panako_output(&stdout))
    }
}

impl CommandLineBackend {
    /// Grab a single frame as PNG through image2pipe and decode it.
    fn decode_frame(&self, path: &Path, timestamp: f64) -> MediaResult<RgbImage> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-v", "error"])
            .arg("-ss")
            .arg(format!("{timestamp:.3}"))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]);

        let output = run_with_timeout("ffmpeg", &mut cmd, secs(self.tools.frame_timeout_secs))?;
        let output = check_success("ffmpeg", output)?;

        if output.stdout.is_empty() {
            return Err(MediaError::DecodeFailure(format!(
                "no frame at {timestamp:.2}s"
            )));
        }

        let image = image::load_from_memory(&output.stdout)
            .map_err(|e| MediaError::DecodeFailure(format!("PNG decode failed: {e}")))?;
        Ok(image.to_rgb8())
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

/// Convert little-endian f32 PCM bytes to samples. Trailing partial
/// samples are dropped.
pub fn bytes_to_f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Extract the value of the `FINGERPRINT=` line from fpcalc output.
pub fn parse_fpcalc_output(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("FINGERPRINT="))
        .map(|fp| fp.trim().to_string())
        .filter(|fp| !fp.is_empty())
}

/// Collect `pts_time:` values from ffmpeg showinfo log lines.
pub fn parse_scene_cuts(stderr: &str) -> Vec<f64> {
    let mut cuts: Vec<f64> = stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .filter_map(|line| {
            let rest = &line[line.find("pts_time:")? + "pts_time:".len()..];
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|t| t.is_finite() && *t > 0.0)
        .collect();
    cuts.sort_by(|a, b| a.total_cmp(b));
    cuts.dedup();
    cuts
}

/// Path for a decoded WAV inside a Panako workspace.
pub(crate) fn wav_path(dir: &Path, prefix: &str, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    dir.join(format!("{prefix}_{stem}.wav"))
}
