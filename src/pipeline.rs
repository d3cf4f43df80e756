use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::backend::{invoker, TranscriptionBackend};
use crate::ingest::{self, IngestError, UploadedAudio};
use crate::normalize::{NormalizeError, Normalizer};
use crate::outcome::Outcome;
use crate::temp::ScratchScope;

/// Runs one upload through ingest → normalize → invoke and guarantees that
/// every scratch file the request created is gone before the outcome is
/// returned. Cleanup also runs from the scope's `Drop` if the request future
/// is cancelled mid-stage.
pub async fn transcribe(
    backend: Arc<dyn TranscriptionBackend>,
    normalizer: &dyn Normalizer,
    deadline: Duration,
    upload: UploadedAudio,
    prompt: &str,
) -> Outcome {
    let mut scope = ScratchScope::new();
    let outcome = run_stages(&mut scope, backend, normalizer, deadline, upload, prompt).await;
    scope.release_all();
    if let Outcome::Success { text } = &outcome {
        info!(chars = text.len(), "transcription completed");
    } else {
        info!(status = %outcome.status(), "transcription finished without text");
    }
    outcome
}

/// The linear stage sequence. Every failure returns an Outcome instead of
/// propagating, so the caller's cleanup always runs before the response.
pub(crate) async fn run_stages(
    scope: &mut ScratchScope,
    backend: Arc<dyn TranscriptionBackend>,
    normalizer: &dyn Normalizer,
    deadline: Duration,
    upload: UploadedAudio,
    prompt: &str,
) -> Outcome {
    info!(
        filename = upload.filename.as_deref().unwrap_or("unknown"),
        content_type = upload.content_type.as_deref().unwrap_or("unknown"),
        size = upload.bytes.len(),
        backend = backend.name(),
        "transcription request started"
    );

    let input = match ingest::ingest(scope, &upload).await {
        Ok(path) => path,
        Err(IngestError::Io(err)) => {
            error!(%err, "failed to store upload");
            return Outcome::Unavailable {
                detail: format!("Failed to store upload: {err}"),
            };
        }
        Err(err) => {
            return Outcome::ValidationError {
                detail: err.to_string(),
            }
        }
    };

    let spec = backend.normalization();
    let normalized = match normalizer.normalize(scope, &input, &spec).await {
        Ok(path) => path,
        Err(err @ NormalizeError::ToolMissing) => {
            return Outcome::Unavailable {
                detail: err.to_string(),
            }
        }
        Err(err) => {
            return Outcome::ConversionError {
                detail: err.to_string(),
            }
        }
    };

    // The original container is no longer needed once the WAV exists.
    scope.release(&input);

    let audio = match tokio::fs::read(&normalized).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(%err, "failed to read converted audio");
            return Outcome::Unavailable {
                detail: format!("Failed to read converted audio: {err}"),
            };
        }
    };

    invoker::invoke_with_deadline(backend, audio, prompt.to_string(), deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FakeNormalizer, StubBackend, StubBehavior};

    const DEADLINE: Duration = Duration::from_secs(30);

    fn wav_upload(bytes: &[u8]) -> UploadedAudio {
        UploadedAudio {
            bytes: bytes.to_vec(),
            filename: Some("clip.wav".into()),
            content_type: Some("audio/wav".into()),
        }
    }

    async fn run(
        scope: &mut ScratchScope,
        backend: Arc<StubBackend>,
        normalizer: &FakeNormalizer,
        upload: UploadedAudio,
    ) -> Outcome {
        run_stages(
            scope,
            backend,
            normalizer,
            DEADLINE,
            upload,
            "prompt",
        )
        .await
    }

    #[tokio::test]
    async fn happy_path_returns_recognized_text() {
        let backend = Arc::new(StubBackend::returning_text("Hallo Welt"));
        let normalizer = FakeNormalizer::producing(b"RIFFfakewav");
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend.clone(), &normalizer, wav_upload(b"xxx")).await;
        assert_eq!(
            outcome,
            Outcome::Success {
                text: "Hallo Welt".into()
            }
        );
        assert_eq!(backend.calls(), 1);

        scope.release_all();
        assert_eq!(scope.acquired(), 2); // input + normalized
        assert_eq!(scope.released(), 2);
    }

    #[tokio::test]
    async fn empty_upload_short_circuits_before_conversion() {
        let backend = Arc::new(StubBackend::returning_text("unused"));
        let normalizer = FakeNormalizer::producing(b"RIFF");
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend.clone(), &normalizer, wav_upload(b"")).await;
        assert!(matches!(outcome, Outcome::ValidationError { .. }));
        assert_eq!(normalizer.invocations(), 0);
        assert_eq!(backend.calls(), 0);
        assert_eq!(scope.acquired(), 0);
    }

    #[tokio::test]
    async fn text_plain_upload_is_rejected_before_conversion() {
        let backend = Arc::new(StubBackend::returning_text("unused"));
        let normalizer = FakeNormalizer::producing(b"RIFF");
        let mut scope = ScratchScope::new();

        let upload = UploadedAudio {
            bytes: b"just text".to_vec(),
            filename: None,
            content_type: Some("text/plain".into()),
        };
        let outcome = run(&mut scope, backend, &normalizer, upload).await;
        assert!(matches!(outcome, Outcome::ValidationError { .. }));
        assert_eq!(normalizer.invocations(), 0);
    }

    #[tokio::test]
    async fn conversion_failure_surfaces_stderr_and_balances_cleanup() {
        let backend = Arc::new(StubBackend::returning_text("unused"));
        let normalizer = FakeNormalizer::failing("Invalid data found when processing input");
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend.clone(), &normalizer, wav_upload(b"xxx")).await;
        match &outcome {
            Outcome::ConversionError { detail } => {
                assert!(detail.contains("Invalid data found"));
            }
            other => panic!("expected ConversionError, got {other:?}"),
        }
        assert_eq!(backend.calls(), 0);

        scope.release_all();
        assert_eq!(scope.acquired(), scope.released());
    }

    #[tokio::test]
    async fn missing_tool_maps_to_unavailable() {
        let backend = Arc::new(StubBackend::returning_text("unused"));
        let normalizer = FakeNormalizer::without_tool();
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend, &normalizer, wav_upload(b"xxx")).await;
        match &outcome {
            Outcome::Unavailable { detail } => assert!(detail.contains("ffmpeg")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
        scope.release_all();
        assert_eq!(scope.acquired(), scope.released());
    }

    #[tokio::test]
    async fn empty_converted_audio_never_reaches_the_backend() {
        let backend = Arc::new(StubBackend::returning_text("unused"));
        let normalizer = FakeNormalizer::producing(b"");
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend.clone(), &normalizer, wav_upload(b"xxx")).await;
        assert!(matches!(outcome, Outcome::ValidationError { .. }));
        assert_eq!(backend.calls(), 0);

        scope.release_all();
        assert_eq!(scope.acquired(), scope.released());
    }

    #[tokio::test]
    async fn deadline_expiry_still_balances_cleanup() {
        let backend = Arc::new(StubBackend::never_completing());
        let normalizer = FakeNormalizer::producing(b"RIFFfakewav");
        let mut scope = ScratchScope::new();

        let outcome = run_stages(
            &mut scope,
            backend,
            &normalizer,
            Duration::from_millis(50),
            wav_upload(b"xxx"),
            "prompt",
        )
        .await;
        assert_eq!(outcome, Outcome::Timeout);

        scope.release_all();
        assert_eq!(scope.acquired(), 2);
        assert_eq!(scope.released(), 2);
    }

    #[tokio::test]
    async fn wrapper_deletes_scratch_files_on_success() {
        let backend = Arc::new(StubBackend::returning_text("ok"));
        let normalizer = FakeNormalizer::producing(b"RIFFfakewav");
        let outcome = transcribe(
            backend,
            &normalizer,
            DEADLINE,
            wav_upload(b"xxx"),
            "prompt",
        )
        .await;
        assert!(matches!(outcome, Outcome::Success { .. }));
    }

    #[tokio::test]
    async fn blocked_finish_reason_flows_through_classification() {
        let backend = Arc::new(StubBackend::with(StubBehavior::FinishReason(
            "RECITATION".into(),
        )));
        let normalizer = FakeNormalizer::producing(b"RIFFfakewav");
        let mut scope = ScratchScope::new();

        let outcome = run(&mut scope, backend, &normalizer, wav_upload(b"xxx")).await;
        match outcome {
            Outcome::Blocked { reason, guidance } => {
                assert_eq!(reason, "RECITATION");
                assert!(guidance.is_some());
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }
}
