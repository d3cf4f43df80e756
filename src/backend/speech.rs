use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::backend::{BackendResult, TranscriptionBackend};
use crate::normalize::NormalizationSpec;

const DEFAULT_API_BASE: &str = "https://speech.googleapis.com";

/// Dedicated recognition backend: a structured `speech:recognize` request
/// carrying LINEAR16 audio. No prompts, no block/finish semantics — the
/// response either has transcripts or it does not.
#[derive(Debug)]
pub struct SpeechBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    language: String,
    model: String,
}

impl SpeechBackend {
    pub fn new(
        api_key: &str,
        language: &str,
        model: &str,
        api_base: Option<&str>,
    ) -> Result<Self, String> {
        if api_key.is_empty() {
            return Err("Speech recognition API key is not set".to_string());
        }
        let base = api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');
        Url::parse(base).map_err(|err| format!("Invalid API base {base}: {err}"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: format!("{base}/v1/speech:recognize"),
            api_key: api_key.to_string(),
            language: language.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TranscriptionBackend for SpeechBackend {
    fn name(&self) -> &'static str {
        "speech"
    }

    fn normalization(&self) -> NormalizationSpec {
        NormalizationSpec {
            sample_rate: 16_000,
            channels: 1,
            codec: None,
        }
    }

    async fn invoke(&self, audio: Vec<u8>, _prompt: String) -> Result<BackendResult> {
        let spec = self.normalization();
        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16".to_string(),
                sample_rate_hertz: spec.sample_rate,
                language_code: self.language.clone(),
                model: Some(self.model.clone()),
                enable_automatic_punctuation: Some(true),
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&audio),
            },
        };
        debug!(audio_bytes = audio.len(), language = %self.language, "sending audio to recognizer");

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("request to the recognition API failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            bail!("recognition API returned {status}: {message}");
        }
        let recognized = response
            .json::<RecognizeResponse>()
            .await
            .context("failed to decode recognition API response")?;

        Ok(BackendResult {
            block_reason: None,
            finish_reason: None,
            text: Ok(join_transcripts(&recognized)),
        })
    }

    async fn probe(&self) -> Result<String> {
        // There is no cheap text-only call on the recognizer; the readiness
        // story for this backend is /health only.
        Err(anyhow!(
            "connectivity probe is not supported for the speech backend"
        ))
    }
}

/// Top-ranked alternative of each result, joined with single spaces in
/// result order.
fn join_transcripts(response: &RecognizeResponse) -> String {
    response
        .results
        .iter()
        .filter_map(|result| result.alternatives.first())
        .map(|alternative| alternative.transcript.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    encoding: String,
    sample_rate_hertz: u32,
    language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_automatic_punctuation: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechRecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechRecognitionResult {
    #[serde(default)]
    alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechRecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}
