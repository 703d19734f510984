use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::ExtractionMethod;

/// A caption track advertised by the watch page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrackDescriptor {
    pub language_code: String,
    pub is_auto_generated: bool,
    pub payload_url: String,
    pub display_name: Option<String>,
}

/// Which kind of data block the tracks were read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    /// The player response object (`ytInitialPlayerResponse` or the InnerTube player endpoint)
    PlayerResponse,
    /// A loose `captions`/`captionTracks` fragment found elsewhere in the markup
    EmbeddedMarkup,
}

impl TrackSource {
    pub fn method(self) -> ExtractionMethod {
        match self {
            TrackSource::PlayerResponse => ExtractionMethod::TrackApi,
            TrackSource::EmbeddedMarkup => ExtractionMethod::HtmlEmbedded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub tracks: Vec<CaptionTrackDescriptor>,
    pub source: TrackSource,
}

/// Language listing entry for a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub is_auto_generated: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    kind: Option<String>,
    name: Option<TrackName>,
}

#[derive(Debug, Deserialize)]
struct TrackName {
    #[serde(rename = "simpleText")]
    simple_text: Option<String>,
    runs: Option<Vec<TextRun>>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    text: Option<String>,
}

impl From<CaptionTrack> for CaptionTrackDescriptor {
    fn from(t: CaptionTrack) -> Self {
        let display_name = t.name.and_then(|n| {
            n.simple_text.or_else(|| {
                let joined: String = n.runs.unwrap_or_default().into_iter().filter_map(|r| r.text).collect();
                (!joined.is_empty()).then_some(joined)
            })
        });

        Self {
            is_auto_generated: t.kind.as_deref() == Some("asr"),
            payload_url: absolute_url(&t.base_url),
            language_code: t.language_code,
            display_name,
        }
    }
}

fn absolute_url(url: &str) -> String {
    if url.starts_with('/') {
        format!("https://www.youtube.com{url}")
    } else {
        url.to_string()
    }
}

struct Pattern {
    name: &'static str,
    anchor: Regex,
    source: TrackSource,
}

// Each anchor ends on the opening `{` or `[` of the JSON value.
static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    [
        (
            "var ytInitialPlayerResponse",
            r"var\s+ytInitialPlayerResponse\s*=\s*\{",
            TrackSource::PlayerResponse,
        ),
        (
            "window ytInitialPlayerResponse",
            r#"window\[["']ytInitialPlayerResponse["']\]\s*=\s*\{"#,
            TrackSource::PlayerResponse,
        ),
        (
            "keyed ytInitialPlayerResponse",
            r#"["']ytInitialPlayerResponse["']\s*:\s*\{"#,
            TrackSource::PlayerResponse,
        ),
        (
            "ytInitialPlayerResponse assignment",
            r"ytInitialPlayerResponse\s*=\s*\{",
            TrackSource::PlayerResponse,
        ),
        ("captions object", r#""captions"\s*:\s*\{"#, TrackSource::EmbeddedMarkup),
        ("captionTracks array", r#""captionTracks"\s*:\s*\["#, TrackSource::EmbeddedMarkup),
    ]
    .into_iter()
    .map(|(name, re, source)| Pattern {
        name,
        anchor: Regex::new(re).unwrap(),
        source,
    })
    .collect()
});

/// Find caption tracks embedded in a watch page.
///
/// Patterns are tried in order and the first one that both parses and yields
/// at least one track wins. Returns `None` when nothing usable is found.
pub fn locate(markup: &str) -> Option<Located> {
    for pattern in PATTERNS.iter() {
        for m in pattern.anchor.find_iter(markup) {
            let value_start = m.end() - 1;
            let value = match read_json_value(&markup[value_start..]) {
                Some(v) => v,
                None => {
                    debug!("Pattern '{}' matched at {value_start} but did not parse", pattern.name);
                    continue;
                }
            };

            let tracks = tracks_from_value(&value);
            if !tracks.is_empty() {
                debug!("Found {} caption tracks via '{}'", tracks.len(), pattern.name);
                return Some(Located {
                    tracks,
                    source: pattern.source,
                });
            }
        }
    }

    debug!("No caption tracks found in page markup");
    None
}

/// List the caption languages a page advertises
pub fn available_languages(markup: &str) -> Vec<LanguageInfo> {
    locate(markup)
        .map(|located| {
            located
                .tracks
                .into_iter()
                .map(|t| LanguageInfo {
                    name: t.display_name.unwrap_or_else(|| t.language_code.clone()),
                    code: t.language_code,
                    is_auto_generated: t.is_auto_generated,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Read one JSON value from the front of `text`, ignoring whatever follows it.
fn read_json_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// Pull caption tracks out of a player response, a captions object, or a bare track array.
pub(crate) fn tracks_from_value(value: &Value) -> Vec<CaptionTrackDescriptor> {
    let paths: [&[&str]; 3] = [
        &["captions", "playerCaptionsTracklistRenderer", "captionTracks"],
        &["playerCaptionsTracklistRenderer", "captionTracks"],
        &["captionTracks"],
    ];

    let entries = paths
        .iter()
        .find_map(|path| {
            path.iter()
                .try_fold(value, |v, key| v.get(key))
                .and_then(Value::as_array)
        })
        .or_else(|| value.as_array());

    entries
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match serde_json::from_value::<CaptionTrack>(entry.clone()) {
                    Ok(track) => Some(track.into()),
                    Err(e) => {
                        debug!("Skipping malformed caption track entry: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
