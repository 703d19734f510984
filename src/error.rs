use std::time::Duration;

use thiserror::Error;

/// Failure of a single extraction step.
///
/// None of these reach the caller of [`crate::orchestrator::Extractor::extract`]
/// directly: each one ends the current strategy and moves on to the next, and
/// only total exhaustion surfaces, as [`crate::TranscriptOutcome::Unavailable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// No caption data reachable through this strategy.
    #[error("transcript unavailable: {0}")]
    TranscriptUnavailable(String),

    /// Network or HTTP failure while fetching a page or a track payload.
    #[error("fetch of {url} failed: {reason}")]
    TransientFetchFailure { url: String, reason: String },

    /// A structural pattern matched but its content could not be used.
    #[error("malformed source: {0}")]
    MalformedSource(String),

    /// A bounded wait ran out.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },
}

impl From<FetchError> for ExtractError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Status { url, status } => ExtractError::TransientFetchFailure {
                url,
                reason: format!("HTTP {status}"),
            },
            FetchError::Transport { url, reason } => ExtractError::TransientFetchFailure { url, reason },
        }
    }
}

impl From<PageError> for ExtractError {
    fn from(e: PageError) -> Self {
        ExtractError::TranscriptUnavailable(e.to_string())
    }
}

/// Failure of an outbound HTTP request. Always soft.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

/// A timestamp label that does not have the `M:SS` or `H:MM:SS` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp {0:?} must have 2 or 3 colon-separated parts")]
    Arity(String),

    #[error("timestamp {label:?} has a non-numeric part {part:?}")]
    NotANumber { label: String, part: String },

    #[error("timestamp {0:?} is too large")]
    Overflow(String),
}

/// Failure of an operation on the live page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page operation failed: {0}")]
pub struct PageError(pub String);
