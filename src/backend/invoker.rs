use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::{BackendResult, TranscriptionBackend};
use crate::outcome::Outcome;

/// Deadline for the `/test-backend` connectivity probe.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(10);

/// Remediation suggestions returned with a recitation block.
const RECITATION_GUIDANCE: &str = "The backend detected potential copyrighted material. \
For personal study purposes, try:\n\
1. Record your own voice reading the text\n\
2. Use shorter audio segments\n\
3. Paraphrase the content in your own words\n\
4. Use the /transcribe-educational endpoint for fair use cases";

/// Guidance when text extraction itself failed for a content-related cause.
const EXTRACTION_GUIDANCE: &str = "Content may contain copyrighted material. \
For personal study, try recording your own voice or using shorter segments.";

/// Runs the backend call on its own task and enforces `deadline` on the
/// awaiting side. The provider call has no native cancellation; when the
/// deadline elapses the task is abandoned, not aborted — it may still
/// complete (and bill) in the background, but its result is discarded.
pub async fn invoke_with_deadline(
    backend: Arc<dyn TranscriptionBackend>,
    audio: Vec<u8>,
    prompt: String,
    deadline: Duration,
) -> Outcome {
    if audio.is_empty() {
        return Outcome::ValidationError {
            detail: "Converted audio is empty".to_string(),
        };
    }

    let name = backend.name();
    let call = tokio::spawn(async move { backend.invoke(audio, prompt).await });
    match tokio::time::timeout(deadline, call).await {
        Err(_) => {
            warn!(backend = name, ?deadline, "backend call exceeded deadline, abandoning it");
            Outcome::Timeout
        }
        Ok(Err(join_err)) => Outcome::TransportError {
            detail: format!("Backend task failed: {join_err}"),
        },
        Ok(Ok(Err(err))) => Outcome::TransportError {
            detail: format!("Backend request failed: {err:#}"),
        },
        Ok(Ok(Ok(result))) => classify(result),
    }
}

/// Connectivity probe under its own (shorter) deadline.
pub async fn probe_with_deadline(
    backend: Arc<dyn TranscriptionBackend>,
    deadline: Duration,
) -> Outcome {
    let call = tokio::spawn(async move { backend.probe().await });
    match tokio::time::timeout(deadline, call).await {
        Err(_) => Outcome::Timeout,
        Ok(Err(join_err)) => Outcome::TransportError {
            detail: format!("Backend task failed: {join_err}"),
        },
        Ok(Ok(Err(err))) => Outcome::Unavailable {
            detail: format!("Backend probe failed: {err:#}"),
        },
        Ok(Ok(Ok(text))) => Outcome::Success { text },
    }
}

/// Folds a completed call into exactly one Outcome variant.
pub fn classify(result: BackendResult) -> Outcome {
    if let Some(reason) = result.block_reason {
        info!(%reason, "backend blocked the prompt");
        return Outcome::Blocked {
            reason,
            guidance: None,
        };
    }

    if let Some(reason) = result.finish_reason.as_deref() {
        match reason {
            "RECITATION" => {
                return Outcome::Blocked {
                    reason: "RECITATION".to_string(),
                    guidance: Some(RECITATION_GUIDANCE.to_string()),
                }
            }
            "SAFETY" | "MAX_TOKENS" => {
                return Outcome::Incomplete {
                    reason: reason.to_string(),
                }
            }
            // STOP and unknown reasons fall through to text extraction.
            _ => {}
        }
    }

    match result.text {
        Err(failure) if failure.content_related => Outcome::Blocked {
            reason: failure.detail,
            guidance: Some(EXTRACTION_GUIDANCE.to_string()),
        },
        Err(failure) => Outcome::TransportError {
            detail: format!("Failed to extract transcription: {}", failure.detail),
        },
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                Outcome::Empty
            } else {
                Outcome::Success {
                    text: text.to_string(),
                }
            }
        }
    }
}
