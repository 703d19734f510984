use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::extract_video_id;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const NO_DESCRIPTION: &str = "No description available";

const TITLE_SELECTORS: &[&str] = &[
    "h1.ytd-video-primary-info-renderer",
    "h1.title",
    ".ytd-video-primary-info-renderer h1",
    "ytd-video-primary-info-renderer h1",
    "#container h1",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    "ytd-watch-metadata #description-inline-expander #description-text",
    "ytd-watch-metadata #description-text",
    "#watch-description-text",
    "#description-inline-expander #description-text",
    "#description-text",
    "#description ytd-text-inline-expander-renderer",
    ".ytd-video-secondary-info-renderer #description",
    "#description .content",
    "ytd-video-secondary-info-renderer #description",
];

static SHORT_DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""shortDescription"\s*:\s*("(?:[^"\\]|\\.)*")"#).unwrap());

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""videoId"\s*:\s*"([A-Za-z0-9_-]{11})""#).unwrap());

/// Title and description of a watch page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
}

impl VideoMetadata {
    pub fn from_markup(markup: &str) -> Self {
        let doc = Html::parse_document(markup);
        Self {
            title: title(&doc).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            description: description(&doc, markup).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        }
    }
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            description: NO_DESCRIPTION.to_string(),
        }
    }
}

/// The video a page shows, from its canonical link, `og:url`, or the first
/// `"videoId"` in its embedded JSON.
pub fn page_video_id(markup: &str) -> Option<String> {
    let doc = Html::parse_document(markup);
    let from_attr = |css: &str, attr: &str| {
        let sel = Selector::parse(css).ok()?;
        doc.select(&sel)
            .filter_map(|el| el.value().attr(attr))
            .find_map(extract_video_id)
    };

    from_attr(r#"link[rel="canonical"]"#, "href")
        .or_else(|| from_attr(r#"meta[property="og:url"]"#, "content"))
        .or_else(|| VIDEO_ID_RE.captures(markup).map(|caps| caps[1].to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        doc.select(&sel)
            .next()
            .and_then(|el| non_empty(&el.text().collect::<String>()))
    })
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .find_map(|el| el.value().attr("content").and_then(non_empty))
}

fn title(doc: &Html) -> Option<String> {
    first_text(doc, TITLE_SELECTORS)
        .or_else(|| meta_content(doc, r#"meta[name="title"]"#))
        .or_else(|| {
            let sel = Selector::parse("title").ok()?;
            let text = doc.select(&sel).next()?.text().collect::<String>();
            non_empty(text.trim().trim_end_matches(" - YouTube"))
        })
}

fn description(doc: &Html, markup: &str) -> Option<String> {
    first_text(doc, DESCRIPTION_SELECTORS)
        .or_else(|| meta_content(doc, r#"meta[name="description"]"#))
        .or_else(|| meta_content(doc, r#"meta[property="og:description"]"#))
        .or_else(|| {
            let caps = SHORT_DESCRIPTION_RE.captures(markup)?;
            let decoded: String = serde_json::from_str(&caps[1]).ok()?;
            non_empty(&decoded)
        })
}
