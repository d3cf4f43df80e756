use anyhow::Result;
use async_trait::async_trait;

use crate::normalize::NormalizationSpec;

pub mod gemini;
pub mod invoker;
pub mod speech;

/// What a backend call produced, reduced to the capability the classifier
/// needs: a possible prompt-level block, the first candidate's finish
/// reason, and the extractable text. Each backend maps its own wire format
/// into this shape; nothing downstream touches a provider response type.
#[derive(Debug)]
pub struct BackendResult {
    pub block_reason: Option<String>,
    pub finish_reason: Option<String>,
    pub text: Result<String, ExtractionFailure>,
}

/// The response was structurally present but carried no usable text.
#[derive(Debug)]
pub struct ExtractionFailure {
    pub detail: String,
    /// True when the missing text traces back to a content/finish-reason
    /// cause rather than a malformed response.
    pub content_related: bool,
}

/// One of the two interchangeable external transcription providers.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// The canonical audio encoding this backend expects from conversion.
    fn normalization(&self) -> NormalizationSpec;

    /// Issues the recognition call. `prompt` is only meaningful for the
    /// multimodal variant; the dedicated recognizer ignores it.
    async fn invoke(&self, audio: Vec<u8>, prompt: String) -> Result<BackendResult>;

    /// Cheap connectivity check for `/test-backend`.
    async fn probe(&self) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{BackendResult, ExtractionFailure, TranscriptionBackend};
    use crate::normalize::{NormalizationSpec, NormalizeError, Normalizer};
    use crate::temp::{ScratchScope, Stage};

    pub(crate) enum StubBehavior {
        Text(String),
        Sleep(Duration),
        Transport(String),
        Blocked(String),
        FinishReason(String),
        NoTextParts { content_related: bool },
    }

    pub(crate) struct StubBackend {
        pub behavior: StubBehavior,
        pub calls: AtomicUsize,
    }

    impl StubBackend {
        pub(crate) fn returning_text(text: &str) -> Self {
            Self::with(StubBehavior::Text(text.to_string()))
        }

        pub(crate) fn never_completing() -> Self {
            Self::with(StubBehavior::Sleep(Duration::from_secs(3600)))
        }

        pub(crate) fn with(behavior: StubBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptionBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn normalization(&self) -> NormalizationSpec {
            NormalizationSpec {
                sample_rate: 16_000,
                channels: 1,
                codec: Some("pcm_s16le"),
            }
        }

        async fn invoke(&self, _audio: Vec<u8>, _prompt: String) -> Result<BackendResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                StubBehavior::Text(text) => Ok(BackendResult {
                    block_reason: None,
                    finish_reason: None,
                    text: Ok(text.clone()),
                }),
                StubBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(BackendResult {
                        block_reason: None,
                        finish_reason: None,
                        text: Ok(String::new()),
                    })
                }
                StubBehavior::Transport(detail) => Err(anyhow!("{detail}")),
                StubBehavior::Blocked(reason) => Ok(BackendResult {
                    block_reason: Some(reason.clone()),
                    finish_reason: None,
                    text: Ok(String::new()),
                }),
                StubBehavior::FinishReason(reason) => Ok(BackendResult {
                    block_reason: None,
                    finish_reason: Some(reason.clone()),
                    text: Err(ExtractionFailure {
                        detail: format!("no text parts (finish reason {reason})"),
                        content_related: true,
                    }),
                }),
                StubBehavior::NoTextParts { content_related } => Ok(BackendResult {
                    block_reason: None,
                    finish_reason: None,
                    text: Err(ExtractionFailure {
                        detail: "response contained no text parts".to_string(),
                        content_related: *content_related,
                    }),
                }),
            }
        }

        async fn probe(&self) -> Result<String> {
            match &self.behavior {
                StubBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(String::new())
                }
                StubBehavior::Transport(detail) => Err(anyhow!("{detail}")),
                _ => Ok("Hello, I am working!".to_string()),
            }
        }
    }

    /// Normalizer double producing deterministic bytes without a subprocess.
    pub(crate) struct FakeNormalizer {
        pub bytes: Vec<u8>,
        pub fail_with: Option<String>,
        pub tool_missing: bool,
        pub invocations: AtomicUsize,
    }

    impl FakeNormalizer {
        pub(crate) fn producing(bytes: &[u8]) -> Self {
            Self {
                bytes: bytes.to_vec(),
                fail_with: None,
                tool_missing: false,
                invocations: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(stderr: &str) -> Self {
            Self {
                fail_with: Some(stderr.to_string()),
                ..Self::producing(b"")
            }
        }

        pub(crate) fn without_tool() -> Self {
            Self {
                tool_missing: true,
                ..Self::producing(b"")
            }
        }

        pub(crate) fn invocations(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Normalizer for FakeNormalizer {
        async fn normalize(
            &self,
            scope: &mut ScratchScope,
            _input: &Path,
            _spec: &NormalizationSpec,
        ) -> Result<PathBuf, NormalizeError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.tool_missing {
                return Err(NormalizeError::ToolMissing);
            }
            if let Some(stderr) = &self.fail_with {
                return Err(NormalizeError::Failed(stderr.clone()));
            }
            let output = scope.acquire(Stage::Normalized, ".wav");
            std::fs::write(&output, &self.bytes).map_err(NormalizeError::Spawn)?;
            Ok(output)
        }

        fn is_available(&self) -> bool {
            !self.tool_missing
        }
    }
}
