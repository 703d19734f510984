use std::sync::atomic::{AtomicUsize, Ordering};

use eyre::{Result, bail};
use log::{debug, info, warn};
use serde_json::{Value, json};
use thiserror::Error;

use crate::TranscriptOutcome;
use crate::metadata::VideoMetadata;
use crate::retry::RetryPolicy;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_PROMPT: &str = "You are an AI assistant specialized in analyzing video content from transcripts. \
Analyze the provided YouTube video transcript and provide a comprehensive analysis in the exact format shown below.

Brief Summary:
[A concise paragraph (3-5 sentences) on the core subject matter, main arguments, and key takeaways of the entire video.]

Key Points with Timestamps:

[For each important concept, topic, or section, use this exact format:]

HH:MM:SS - HH:MM:SS | [Concept/Heading]: [Brief explanation of what is discussed in that segment]";

const NO_TRANSCRIPT_NOTE: &str = "Note: No transcript was available for this video. Please provide an analysis \
based on the title and description following the same format above, but note that specific timestamps cannot \
be provided due to lack of transcript.";

/// Everything the analysis prompt is built from
pub struct AnalysisRequest<'a> {
    pub video_url: String,
    pub metadata: &'a VideoMetadata,
    pub transcript: &'a TranscriptOutcome,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(metadata: &'a VideoMetadata, transcript: &'a TranscriptOutcome) -> Self {
        Self {
            video_url: crate::watch_url(transcript.video_id()),
            metadata,
            transcript,
        }
    }

    /// Fill `template` and append the metadata block and the transcript.
    ///
    /// `{title}`, `{description}`, `{videoUrl}` and `{transcript}` are
    /// substituted. The transcript is appended when the template does not
    /// place it, and is never shortened.
    pub fn build_prompt(&self, template: &str) -> String {
        let transcript = match self.transcript {
            TranscriptOutcome::Available(_) => self.transcript.to_prompt_text(),
            TranscriptOutcome::Unavailable { .. } => "No transcript available for this video.".to_string(),
        };

        let mut prompt = template
            .replace("{title}", &self.metadata.title)
            .replace("{description}", &self.metadata.description)
            .replace("{videoUrl}", &self.video_url)
            .replace("{transcript}", &transcript);

        prompt.push_str(&format!(
            "\n\nVideo Title: {}\nVideo Description: {}\nVideo URL: {}",
            self.metadata.title, self.metadata.description, self.video_url
        ));

        if self.transcript.is_available() {
            if !template.contains("{transcript}") {
                prompt.push_str("\n\nHere is the complete YouTube video transcript with timestamps:\n\n");
                prompt.push_str(&transcript);
            }
        } else {
            prompt.push_str("\n\n");
            prompt.push_str(NO_TRANSCRIPT_NOTE);
        }
        prompt
    }
}

#[derive(Debug, Error)]
enum GeminiError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),
}

impl GeminiError {
    fn is_retryable(&self) -> bool {
        match self {
            GeminiError::RateLimited | GeminiError::Transport(_) => true,
            GeminiError::Status { status, .. } => *status >= 500,
        }
    }
}

/// `generateContent` client that spreads requests over several API keys
pub struct GeminiClient {
    client: reqwest::Client,
    api_keys: Vec<String>,
    next_key: AtomicUsize,
    model: String,
    policy: RetryPolicy,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_keys: Vec<String>, model: &str) -> Result<Self> {
        let api_keys: Vec<String> = api_keys.into_iter().filter(|k| !k.trim().is_empty()).collect();
        if api_keys.is_empty() {
            bail!("no Gemini API key configured (set api_keys in the config file or GEMINI_API_KEY)");
        }
        Ok(Self {
            client,
            api_keys,
            next_key: AtomicUsize::new(0),
            model: model.to_string(),
            policy: RetryPolicy::default(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Round-robin over the configured keys; a rate-limited retry lands on
    /// the next one.
    fn next_api_key(&self) -> &str {
        let index = self.next_key.fetch_add(1, Ordering::Relaxed) % self.api_keys.len();
        &self.api_keys[index]
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        info!("Sending analysis request to {} ({} prompt chars)", self.model, prompt.len());
        let body = request_body(prompt);
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let json = self
            .policy
            .retry_if(
                |attempt| {
                    let key = self.next_api_key().to_string();
                    let (url, body) = (&url, &body);
                    async move {
                        debug!("Gemini attempt {} with key #{}", attempt + 1, self.key_position(&key));
                        self.send(url, &key, body).await
                    }
                },
                GeminiError::is_retryable,
            )
            .await
            .map_err(|e| eyre::eyre!("Gemini API request to {} failed: {e}", self.model))?;

        extract_gemini_text(&json)
    }

    fn key_position(&self, key: &str) -> usize {
        self.api_keys.iter().position(|k| k == key).unwrap_or_default()
    }

    async fn send(&self, url: &str, key: &str, body: &Value) -> std::result::Result<Value, GeminiError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            warn!("Gemini rate limit hit, rotating API key");
            return Err(GeminiError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }

        resp.json().await.map_err(|e| GeminiError::Transport(e.to_string()))
    }
}

fn request_body(prompt: &str) -> Value {
    let safety: Vec<Value> = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|category| json!({ "category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
    .collect();

    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": 0.7,
            "topK": 40,
            "topP": 0.95,
            "maxOutputTokens": 4096,
            "candidateCount": 1
        },
        "safetySettings": safety
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Concatenated text parts of the first candidate
pub fn extract_gemini_text(json: &Value) -> Result<String> {
    if let Some(parts) = json.pointer("/candidates/0/content/parts").and_then(Value::as_array) {
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text")?.as_str())
            .collect::<Vec<_>>()
            .join("");
        if !text.is_empty() {
            return Ok(text);
        }
    }
    bail!("invalid response format from Gemini API");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::assemble;
    use crate::{ExtractionMethod, NO_TRANSCRIPT, RawSegment};

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Ferris Talks".to_string(),
            description: "About crabs".to_string(),
        }
    }

    fn available() -> TranscriptOutcome {
        let raw = vec![
            RawSegment::new(Some(0.0), Some(2.0), "hello"),
            RawSegment::new(Some(65.0), Some(2.0), "crabs"),
        ];
        let t = assemble::assemble("abcdefghijk", &raw, ExtractionMethod::TrackApi, None, 5.0).unwrap();
        TranscriptOutcome::Available(Arc::new(t))
    }

    #[test]
    fn test_prompt_appends_transcript_verbatim() {
        let meta = metadata();
        let outcome = available();
        let prompt = AnalysisRequest::new(&meta, &outcome).build_prompt("Analyze {title}.");

        assert!(prompt.starts_with("Analyze Ferris Talks."));
        assert!(prompt.contains("Video URL: https://www.youtube.com/watch?v=abcdefghijk"));
        assert!(prompt.ends_with("timestamps:\n\n[0:00] hello\n[1:05] crabs"));
    }

    #[test]
    fn test_prompt_places_transcript_once() {
        let meta = metadata();
        let outcome = available();
        let prompt = AnalysisRequest::new(&meta, &outcome).build_prompt("T:\n{transcript}\nEnd");

        assert!(prompt.starts_with("T:\n[0:00] hello\n[1:05] crabs\nEnd"));
        assert_eq!(prompt.matches("[1:05] crabs").count(), 1);
    }

    #[test]
    fn test_prompt_without_transcript() {
        let meta = metadata();
        let outcome = TranscriptOutcome::Unavailable {
            video_id: "abcdefghijk".to_string(),
            failures: vec![],
        };
        let prompt = AnalysisRequest::new(&meta, &outcome).build_prompt(DEFAULT_PROMPT);

        assert!(prompt.contains("Video Title: Ferris Talks"));
        assert!(prompt.ends_with(NO_TRANSCRIPT_NOTE));
        assert!(!prompt.contains(NO_TRANSCRIPT));
    }

    #[test]
    fn test_request_body_shape() {
        let body = request_body("hi");
        assert_eq!(body.pointer("/contents/0/parts/0/text"), Some(&json!("hi")));
        assert_eq!(body.pointer("/generationConfig/maxOutputTokens"), Some(&json!(4096)));
        assert_eq!(body["safetySettings"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn test_extract_gemini_text() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Brief " }, { "text": "Summary" }] } }]
        });
        assert_eq!(extract_gemini_text(&json).unwrap(), "Brief Summary");
    }

    #[test]
    fn test_extract_gemini_text_invalid() {
        assert!(extract_gemini_text(&json!({ "candidates": [] })).is_err());
        assert!(extract_gemini_text(&json!({ "candidates": [{ "content": { "parts": [] } }] })).is_err());
        assert!(extract_gemini_text(&json!({})).is_err());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":{"message":"API key not valid"}}"#), "API key not valid");
        assert_eq!(error_message("<html>"), "Unknown error");
    }

    #[test]
    fn test_key_rotation() {
        let client = GeminiClient::new(
            reqwest::Client::new(),
            vec!["k1".to_string(), " ".to_string(), "k2".to_string()],
            DEFAULT_MODEL,
        )
        .unwrap();
        assert_eq!(client.next_api_key(), "k1");
        assert_eq!(client.next_api_key(), "k2");
        assert_eq!(client.next_api_key(), "k1");
    }

    #[test]
    fn test_no_keys_is_error() {
        assert!(GeminiClient::new(reqwest::Client::new(), vec![], DEFAULT_MODEL).is_err());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GeminiError::RateLimited.is_retryable());
        assert!(GeminiError::Transport("reset".to_string()).is_retryable());
        assert!(
            GeminiError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !GeminiError::Status {
                status: 400,
                body: String::new()
            }
            .is_retryable()
        );
    }
}
