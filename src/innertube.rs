use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::error::ExtractError;
use crate::fetch::HttpFetch;
use crate::locator::{self, CaptionTrackDescriptor};

const DEFAULT_CLIENT_VERSION: &str = "2.20241126.01.00";

static API_KEY_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).unwrap(),
        // Fallback: the newer pattern
        Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#).unwrap(),
    ]
});
static CLIENT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#).unwrap());

/// The InnerTube API key a watch page embeds, if any
pub fn extract_api_key(html: &str) -> Option<String> {
    API_KEY_RES
        .iter()
        .find_map(|re| re.captures(html).map(|caps| caps[1].to_string()))
}

fn client_version(html: &str) -> String {
    CLIENT_VERSION_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| DEFAULT_CLIENT_VERSION.to_string())
}

pub fn player_url(api_key: &str) -> String {
    format!("https://www.youtube.com/youtubei/v1/player?key={api_key}&prettyPrint=false")
}

/// Ask the InnerTube player endpoint for the caption tracks of a video.
///
/// Needs the API key from the watch page markup.
pub async fn fetch_tracks(
    fetch: &dyn HttpFetch,
    markup: &str,
    video_id: &str,
    lang: &str,
) -> Result<Vec<CaptionTrackDescriptor>, ExtractError> {
    let api_key = extract_api_key(markup)
        .ok_or_else(|| ExtractError::TranscriptUnavailable("no InnerTube API key in watch page".to_string()))?;
    debug!("Extracted InnerTube API key: {api_key}");

    let body = serde_json::json!({
        "context": {
            "client": {
                "hl": lang,
                "gl": "US",
                "clientName": "WEB",
                "clientVersion": client_version(markup)
            }
        },
        "videoId": video_id
    });

    let resp = fetch.post_json(&player_url(&api_key), &body).await?;
    let tracks = locator::tracks_from_value(&resp);
    if tracks.is_empty() {
        return Err(ExtractError::TranscriptUnavailable(format!(
            "no captions available for video {video_id}"
        )));
    }

    debug!("InnerTube player returned {} caption tracks", tracks.len());
    Ok(tracks)
}
