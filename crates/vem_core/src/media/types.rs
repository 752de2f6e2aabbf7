//! Types shared by the media layer and its consumers.

use serde::{Deserialize, Serialize};

/// Kind of elementary stream reported by the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Other,
}

impl CodecType {
    /// Map an ffprobe `codec_type` string.
    pub fn from_probe(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "video" => CodecType::Video,
            "audio" => CodecType::Audio,
            "subtitle" => CodecType::Subtitle,
            "data" => CodecType::Data,
            "attachment" => CodecType::Attachment,
            _ => CodecType::Other,
        }
    }
}

/// One stream inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Absolute stream index within the container.
    pub index: usize,
    pub codec_type: CodecType,
    /// Language tag as reported (e.g. "eng", "jpn").
    pub language: Option<String>,
    /// Track title, used to spot commentary tracks.
    pub title: Option<String>,
}

impl StreamDescriptor {
    pub fn new(index: usize, codec_type: CodecType) -> Self {
        Self {
            index,
            codec_type,
            language: None,
            title: None,
        }
    }

    /// Shorthand for an audio stream.
    pub fn audio(index: usize) -> Self {
        Self::new(index, CodecType::Audio)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type == CodecType::Audio
    }

    /// Whether the title marks this as a commentary track.
    pub fn is_commentary(&self) -> bool {
        self.title
            .as_deref()
            .map(|t| t.to_lowercase().contains("commentary"))
            .unwrap_or(false)
    }
}

/// Time window of a decode, stored in whole milliseconds so it can key a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioWindow {
    start_ms: u64,
    duration_ms: Option<u64>,
}

impl AudioWindow {
    /// The whole stream from the beginning.
    pub const FULL: AudioWindow = AudioWindow {
        start_ms: 0,
        duration_ms: None,
    };

    /// Create a window starting at `start_secs`, optionally limited in length.
    pub fn new(start_secs: f64, duration_secs: Option<f64>) -> Self {
        Self {
            start_ms: secs_to_ms(start_secs),
            duration_ms: duration_secs.map(secs_to_ms),
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_ms.map(|ms| ms as f64 / 1000.0)
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl Default for AudioWindow {
    fn default() -> Self {
        Self::FULL
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Decoded mono PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSamples {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Bytes held by the sample buffer (counted against the cache budget).
    pub fn byte_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}
