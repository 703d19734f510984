use serde_json::json;

use crate::TranscriptOutcome;
use crate::metadata::VideoMetadata;

/// Render as `[M:SS] text` lines, or the no-transcript text
pub fn render_text(outcome: &TranscriptOutcome) -> String {
    outcome.to_prompt_text()
}

/// Render the transcript, or the failure reasons, as pretty JSON
pub fn render_json(outcome: &TranscriptOutcome, metadata: Option<&VideoMetadata>) -> String {
    let value = match outcome {
        TranscriptOutcome::Available(t) => {
            let mut value = serde_json::to_value(t.as_ref()).unwrap_or_default();
            if let Some(meta) = metadata {
                value["title"] = json!(meta.title);
                value["description"] = json!(meta.description);
            }
            value
        }
        TranscriptOutcome::Unavailable { video_id, failures } => json!({
            "video_id": video_id,
            "transcript": crate::NO_TRANSCRIPT,
            "failures": failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }),
    };
    serde_json::to_string_pretty(&value).unwrap_or_default()
}
