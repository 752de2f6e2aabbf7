//! Audio stream selection.

use super::types::StreamDescriptor;

/// Audio streams only, in container order.
pub fn audio_streams(streams: &[StreamDescriptor]) -> Vec<&StreamDescriptor> {
    streams.iter().filter(|s| s.is_audio()).collect()
}

/// Pick the audio stream to analyze.
///
/// Without a language the first audio stream wins. With a language,
/// streams whose tag matches case-insensitively are preferred, and among
/// those non-commentary tracks come first (container order otherwise).
/// When nothing matches the first audio stream is used.
///
/// Returns `None` when the file has no audio at all.
pub fn select_audio_stream(streams: &[StreamDescriptor], language: Option<&str>) -> Option<usize> {
    let audio = audio_streams(streams);
    let first = audio.first()?.index;

    let Some(language) = language.filter(|l| !l.is_empty()) else {
        return Some(first);
    };

    let mut matching: Vec<&StreamDescriptor> = audio
        .into_iter()
        .filter(|s| {
            s.language
                .as_deref()
                .map(|l| l.eq_ignore_ascii_case(language))
                .unwrap_or(false)
        })
        .collect();

    // Stable sort keeps container order within each group
    matching.sort_by_key(|s| s.is_commentary());

    match matching.first() {
        Some(stream) => Some(stream.index),
        None => {
            tracing::debug!(
                "No audio stream tagged '{}', falling back to stream {}",
                language,
                first
            );
            Some(first)
        }
    }
}
