use async_trait::async_trait;
use log::debug;

use crate::error::FetchError;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Outbound HTTP used by the caption-track path. Non-2xx responses are errors
/// the caller treats as soft failures.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, FetchError>;
}

fn transport(url: &str, e: reqwest::Error) -> FetchError {
    match e.status() {
        Some(status) => FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        },
        None => FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        },
    }
}

#[async_trait]
impl HttpFetch for reqwest::Client {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {url}");
        self.get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport(url, e))?
            .text()
            .await
            .map_err(|e| transport(url, e))
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, FetchError> {
        debug!("POST {url}");
        self.post(url)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport(url, e))?
            .json()
            .await
            .map_err(|e| transport(url, e))
    }
}
