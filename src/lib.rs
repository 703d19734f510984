pub mod analyze;
pub mod assemble;
pub mod cache;
pub mod caption_xml;
pub mod config;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod innertube;
pub mod locator;
pub mod metadata;
pub mod orchestrator;
pub mod output;
pub mod retry;
pub mod selection;
pub mod timestamp;

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::orchestrator::StrategyFailure;

/// Text handed downstream when no strategy produced a transcript
pub const NO_TRANSCRIPT: &str = "No transcript available";

/// A timestamped unit as it comes out of an extractor, before normalization.
///
/// `start` and `duration` are `None` when the source did not carry them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub start: Option<f64>,
    pub duration: Option<f64>,
    pub text: String,
    /// `start` was guessed by the extractor rather than read from the source
    pub estimated: bool,
}

impl RawSegment {
    pub fn new(start: Option<f64>, duration: Option<f64>, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            text: text.into(),
            estimated: false,
        }
    }

    pub fn estimated(start: f64, text: impl Into<String>) -> Self {
        Self {
            start: Some(start),
            duration: None,
            text: text.into(),
            estimated: true,
        }
    }
}

/// A single normalized transcript segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: Option<f64>,
    pub timestamp_label: String,
    pub ordinal_index: usize,
    /// Start time was synthesized from the segment position, not read from the source.
    /// Not reliable for seeking.
    pub estimated: bool,
}

/// How the transcript was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    TrackApi,
    HtmlEmbedded,
    DomPanel,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::TrackApi => write!(f, "track-api"),
            ExtractionMethod::HtmlEmbedded => write!(f, "html-embedded"),
            ExtractionMethod::DomPanel => write!(f, "dom-panel"),
        }
    }
}

/// Complete transcript for a video. `segments` is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: String,
    pub language: Option<String>,
    pub extraction_method: ExtractionMethod,
    pub extracted_at: DateTime<Utc>,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// `[M:SS] text` lines, the form the analysis prompt embeds
    pub fn to_lines(&self) -> String {
        assemble::serialize(&self.segments)
    }
}

/// Result of one extraction request: a usable transcript or the explicit sentinel.
#[derive(Debug, Clone)]
pub enum TranscriptOutcome {
    Available(Arc<Transcript>),
    Unavailable {
        video_id: String,
        failures: Vec<StrategyFailure>,
    },
}

impl TranscriptOutcome {
    pub fn transcript(&self) -> Option<&Arc<Transcript>> {
        match self {
            TranscriptOutcome::Available(t) => Some(t),
            TranscriptOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, TranscriptOutcome::Available(_))
    }

    pub fn video_id(&self) -> &str {
        match self {
            TranscriptOutcome::Available(t) => &t.video_id,
            TranscriptOutcome::Unavailable { video_id, .. } => video_id,
        }
    }

    /// Line-format transcript, or [`NO_TRANSCRIPT`] for the sentinel
    pub fn to_prompt_text(&self) -> String {
        match self {
            TranscriptOutcome::Available(t) => t.to_lines(),
            TranscriptOutcome::Unavailable { .. } => NO_TRANSCRIPT.to_string(),
        }
    }
}

static BARE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap());
static URL_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // youtube.com/watch?v=ID
        r"youtube\.com/watch\?(?:.*&)?v=([a-zA-Z0-9_-]{11})",
        // youtu.be/ID
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/embed/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/live/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if BARE_ID_RE.is_match(input) {
        return Some(input.to_string());
    }

    URL_ID_RES
        .iter()
        .find_map(|re| re.captures(input).map(|caps| caps[1].to_string()))
}

/// Canonical watch page URL for a video
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
