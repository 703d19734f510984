use std::sync::LazyLock;

use log::debug;
use quick_xml::events::BytesStart;
use regex::Regex;

use crate::RawSegment;
use crate::error::ExtractError;

static OPEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<text\b([^>]*)>").unwrap());
static INNER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Structural shape of a caption payload, strictest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Every timed entry carries `start` and `dur`
    StartAndDuration,
    /// Entries carry `start`; `dur` may be missing
    StartOnly,
    /// No timing attributes at all
    Untimed,
}

#[derive(Debug)]
struct Entry {
    start: Option<f64>,
    dur: Option<f64>,
    body: String,
}

/// Decode a caption track payload into raw segments.
///
/// Returns `None` when no entry yields any text.
pub fn decode(xml: &str) -> Option<Vec<RawSegment>> {
    let entries = scan_entries(xml);
    let layout = detect_layout(&entries)?;
    debug!("Caption payload: {} entries, layout {layout:?}", entries.len());

    let selected: Vec<&Entry> = match layout {
        Layout::StartAndDuration | Layout::StartOnly => entries.iter().filter(|e| e.start.is_some()).collect(),
        Layout::Untimed => entries.iter().collect(),
    };

    let mut segments = Vec::with_capacity(selected.len());
    for (i, entry) in selected.iter().enumerate() {
        let text = decode_entities(&INNER_TAG_RE.replace_all(&entry.body, " "));
        if text.is_empty() {
            continue;
        }

        let (start, duration) = match layout {
            Layout::StartAndDuration => (entry.start, entry.dur),
            Layout::StartOnly => {
                let next_start = selected.get(i + 1).and_then(|n| n.start);
                (entry.start, entry.dur.or_else(|| estimate_duration(entry.start, next_start)))
            }
            Layout::Untimed => (None, None),
        };
        segments.push(RawSegment::new(start, duration, text));
    }

    if segments.is_empty() {
        debug!("Caption payload had entries but no text");
        None
    } else {
        Some(segments)
    }
}

/// Pick the strictest layout that accounts for every timed entry.
fn detect_layout(entries: &[Entry]) -> Option<Layout> {
    let timed = entries.iter().filter(|e| e.start.is_some()).count();
    let with_dur = entries.iter().filter(|e| e.start.is_some() && e.dur.is_some()).count();

    if with_dur > 0 && with_dur == timed {
        Some(Layout::StartAndDuration)
    } else if timed > 0 {
        Some(Layout::StartOnly)
    } else if !entries.is_empty() {
        Some(Layout::Untimed)
    } else {
        None
    }
}

fn estimate_duration(start: Option<f64>, next_start: Option<f64>) -> Option<f64> {
    match (start, next_start) {
        (Some(s), Some(n)) if n > s => Some(n - s),
        _ => None,
    }
}

/// Find `<text>` entries. Malformed ones are logged and skipped.
fn scan_entries(xml: &str) -> Vec<Entry> {
    let opens: Vec<_> = OPEN_TAG_RE.captures_iter(xml).collect();
    let mut entries = Vec::with_capacity(opens.len());

    for (i, caps) in opens.iter().enumerate() {
        let (Some(whole), Some(attrs)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let attrs = attrs.as_str();
        if attrs.trim_end().ends_with('/') {
            // Self-closing <text .../> carries no content
            continue;
        }

        let region_end = opens.get(i + 1).and_then(|c| c.get(0)).map_or(xml.len(), |m| m.start());
        let region = &xml[whole.end()..region_end];
        let Some(close) = region.find("</text>") else {
            debug!("Skipping caption entry at {}: no closing tag", whole.start());
            continue;
        };

        match parse_timing(attrs) {
            Ok((start, dur)) => entries.push(Entry {
                start,
                dur,
                body: region[..close].to_string(),
            }),
            Err(e) => debug!("Skipping caption entry at {}: {e}", whole.start()),
        }
    }

    entries
}

fn parse_timing(attrs: &str) -> Result<(Option<f64>, Option<f64>), ExtractError> {
    let tag = BytesStart::from_content(format!("text{attrs}"), 4);
    let mut start = None;
    let mut dur = None;

    for attr in tag.attributes() {
        let attr = attr.map_err(|e| ExtractError::MalformedSource(format!("caption attribute: {e}")))?;
        let slot = match attr.key.as_ref() {
            b"start" => &mut start,
            b"dur" => &mut dur,
            _ => continue,
        };
        let raw = String::from_utf8_lossy(&attr.value);
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| ExtractError::MalformedSource(format!("caption timing {raw:?}")))?;
        *slot = Some(value);
    }

    Ok((start, dur))
}

/// Decode HTML/XML character references, including the double-escaped form
/// caption payloads use (`&amp;#39;`). Non-breaking spaces become plain spaces.
pub fn decode_entities(text: &str) -> String {
    let once = html_escape::decode_html_entities(text);
    let twice = html_escape::decode_html_entities(&once);
    twice.replace('\u{a0}', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?>
<transcript>
    <text start="0.21" dur="2.34">Hello world</text>
    <text start="2.55" dur="1.50">This is a test</text>
</transcript>"#;

        let segments = decode(xml).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world");
        assert_eq!(segments[0].start, Some(0.21));
        assert_eq!(segments[0].duration, Some(2.34));
        assert_eq!(segments[1].text, "This is a test");
    }

    #[test]
    fn test_decode_missing_dur_keeps_entry_and_followers() {
        let xml = r#"<transcript>
    <text start="0" dur="2">one</text>
    <text start="2">two</text>
    <text start="5" dur="1.5">three</text>
</transcript>"#;

        let segments = decode(xml).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].text, "two");
        assert_eq!(segments[1].start, Some(2.0));
        assert_eq!(segments[1].duration, Some(3.0));
        assert_eq!(segments[2].text, "three");
        assert_eq!(segments[2].duration, Some(1.5));
    }

    #[test]
    fn test_decode_start_only_last_entry_unknown_duration() {
        let xml = r#"<transcript><text start="1">a</text><text start="4">b</text></transcript>"#;
        let segments = decode(xml).unwrap();
        assert_eq!(segments[0].duration, Some(3.0));
        assert_eq!(segments[1].duration, None);
    }

    #[test]
    fn test_decode_untimed() {
        let xml = r#"<transcript><text>first</text><text class="x">second</text></transcript>"#;
        let segments = decode(xml).unwrap();
        assert_eq!(
            segments,
            vec![
                RawSegment::new(None, None, "first"),
                RawSegment::new(None, None, "second"),
            ]
        );
    }

    #[test]
    fn test_decode_attribute_order_irrelevant() {
        let xml = r#"<transcript><text dur="1.0" start="3.0">swapped</text></transcript>"#;
        let segments = decode(xml).unwrap();
        assert_eq!(segments[0].start, Some(3.0));
        assert_eq!(segments[0].duration, Some(1.0));
    }

    #[test]
    fn test_decode_skips_malformed_entry() {
        let xml = r#"<transcript>
    <text start="abc" dur="1">bad start</text>
    <text start="1" dur="1">good</text>
    <text start="2" dur=1>unquoted</text>
    <text start="3" dur="1">also good</text>
</transcript>"#;
        let segments = decode(xml).unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["good", "also good"]);
    }

    #[test]
    fn test_decode_drops_empty_text() {
        let xml = r#"<transcript><text start="0" dur="1">   </text><text start="1" dur="1"/><text start="2" dur="1">kept</text></transcript>"#;
        let segments = decode(xml).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "kept");
    }

    #[test]
    fn test_decode_double_escaped_entities() {
        let xml = r#"<transcript><text start="0.0" dur="1.0">it&amp;#39;s a &amp;quot;test&amp;quot;</text></transcript>"#;
        let segments = decode(xml).unwrap();
        assert_eq!(segments[0].text, "it's a \"test\"");
    }

    #[test]
    fn test_decode_strips_inner_markup() {
        let xml = r##"<transcript><text start="0" dur="1"><font color="#E5E5E5">styled</font> words</text></transcript>"##;
        let segments = decode(xml).unwrap();
        assert_eq!(segments[0].text, "styled  words");
    }

    #[test]
    fn test_decode_nothing() {
        assert!(decode("").is_none());
        assert!(decode(r#"<?xml version="1.0" ?><transcript></transcript>"#).is_none());
        assert!(decode("<html>an error page</html>").is_none());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("A &amp; B &#39;quote&#39;"), "A & B 'quote'");
        assert_eq!(decode_entities("&lt;tag&gt; &quot;q&quot; &#x27;x&#x27; &apos;y&apos;"), "<tag> \"q\" 'x' 'y'");
        assert_eq!(decode_entities("a&nbsp;b"), "a b");
        assert_eq!(decode_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_entities("  padded  "), "padded");
    }
}
