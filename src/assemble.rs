use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::{ExtractionMethod, RawSegment, Transcript, TranscriptSegment, timestamp};

/// Seconds per segment assumed when a source carries no start times
pub const DEFAULT_ESTIMATED_CUE_SECONDS: f64 = 5.0;

static LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{1,2}:\d{2}(?::\d{2})?)\]\s*(.+)$").unwrap());

/// Normalize raw segments into transcript segments.
///
/// Source order is kept. Entries that are empty after whitespace
/// normalization are dropped before indices are assigned.
pub fn normalize(raw: &[RawSegment], estimated_cue_seconds: f64) -> Vec<TranscriptSegment> {
    raw.iter()
        .filter_map(|r| {
            let text = normalize_whitespace(&r.text);
            (!text.is_empty()).then_some((r, text))
        })
        .enumerate()
        .map(|(index, (r, text))| {
            let (start, estimated) = match r.start {
                Some(s) if s.is_finite() && s >= 0.0 => (s, r.estimated),
                _ => (index as f64 * estimated_cue_seconds, true),
            };
            TranscriptSegment {
                text,
                start_seconds: start,
                duration_seconds: r.duration.filter(|d| d.is_finite() && *d >= 0.0),
                timestamp_label: timestamp::format_f64(start),
                ordinal_index: index,
                estimated,
            }
        })
        .collect()
}

/// Build a transcript, or `None` when nothing survives normalization
pub fn assemble(
    video_id: &str,
    raw: &[RawSegment],
    method: ExtractionMethod,
    language: Option<String>,
    estimated_cue_seconds: f64,
) -> Option<Transcript> {
    let segments = normalize(raw, estimated_cue_seconds);
    if segments.is_empty() {
        return None;
    }

    Some(Transcript {
        video_id: video_id.to_string(),
        language,
        extraction_method: method,
        extracted_at: Utc::now(),
        segments,
    })
}

/// One `[label] text` line per segment
pub fn serialize(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| format!("[{}] {}", s.timestamp_label, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the line format back into raw segments.
///
/// Lines without a leading label keep an unknown start, so normalization
/// gives them a position-based estimate.
pub fn parse_lines(text: &str) -> Vec<RawSegment> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match LINE_RE.captures(line) {
            Some(caps) => {
                let start = timestamp::parse(&caps[1]).ok().map(|s| s as f64);
                RawSegment::new(start, None, caps[2].trim())
            }
            None => RawSegment::new(None, None, line),
        })
        .collect()
}

/// Collapse runs of whitespace to one space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
