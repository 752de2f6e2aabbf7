//! Panako query output.

use serde::Serialize;

/// Best hit reported by a Panako query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanakoMatch {
    /// Path of the stored file that matched.
    pub match_path: String,
    pub score: i64,
    /// Time stretch factor (1.0 = none).
    pub time_factor: f64,
    /// Frequency shift factor (1.0 = none).
    pub freq_factor: f64,
    /// Fraction of the query covered by the match.
    pub coverage: f64,
}

impl PanakoMatch {
    /// Blend coverage, score, and stretch penalties into a 0-1 confidence.
    pub fn confidence(&self) -> f64 {
        let score_norm = (self.score as f64 / 100.0).min(1.0);
        let time_penalty = 1.0 - (1.0 - self.time_factor).abs().min(0.5);
        let freq_penalty = 1.0 - (1.0 - self.freq_factor).abs().min(0.5);

        let confidence =
            0.4 * self.coverage + 0.3 * score_norm + 0.2 * time_penalty + 0.1 * freq_penalty;
        confidence.clamp(0.0, 1.0)
    }
}

/// Parse the first well-formed result row of `panako query` output.
///
/// Rows are `;`-separated with at least 13 fields: field 5 is the matched
/// path, 9 the score, and 10-12 percentages for time factor, frequency
/// factor, and matched coverage.
pub fn parse_panako_output(output: &str) -> Option<PanakoMatch> {
    output.lines().filter(|l| l.contains(';')).find_map(parse_row)
}

fn parse_row(line: &str) -> Option<PanakoMatch> {
    let parts: Vec<&str> = line.split(';').map(str::trim).collect();
    if parts.len() < 13 {
        return None;
    }

    Some(PanakoMatch {
        match_path: parts[5].to_string(),
        score: parts[9].parse::<f64>().ok()? as i64,
        time_factor: parse_percent(parts[10])?,
        freq_factor: parse_percent(parts[11])?,
        coverage: parse_percent(parts[12])?,
    })
}

fn parse_percent(field: &str) -> Option<f64> {
    field
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .map(|v| v / 100.0)
}
