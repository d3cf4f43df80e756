use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::backend::{BackendResult, ExtractionFailure, TranscriptionBackend};
use crate::normalize::NormalizationSpec;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const PROBE_PROMPT: &str = "Say 'Hello, I am working!'";

/// Multimodal generative backend: prompt text plus inline WAV bytes sent to
/// the `generateContent` REST endpoint.
#[derive(Debug)]
pub struct GeminiBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl GeminiBackend {
    /// Builds the client handle once at startup. A missing key or an invalid
    /// base override is a permanent initialization error, surfaced through
    /// `/health` rather than retried.
    pub fn new(
        api_key: &str,
        model: &str,
        temperature: f32,
        api_base: Option<&str>,
    ) -> Result<Self, String> {
        if api_key.is_empty() {
            return Err("GEMINI_API_KEY environment variable is not set".to_string());
        }
        let base = api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');
        Url::parse(base).map_err(|err| format!("Invalid API base {base}: {err}"))?;
        let model = if model.contains('/') {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: format!("{base}/v1beta/{model}:generateContent"),
            api_key: api_key.to_string(),
            temperature,
        })
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .context("request to the generative API failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            bail!("generative API returned {status}: {message}");
        }
        response
            .json::<GenerateContentResponse>()
            .await
            .context("failed to decode generative API response")
    }
}

#[async_trait]
impl TranscriptionBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn normalization(&self) -> NormalizationSpec {
        NormalizationSpec {
            sample_rate: 48_000,
            channels: 1,
            codec: Some("pcm_s16le"),
        }
    }

    async fn invoke(&self, audio: Vec<u8>, prompt: String) -> Result<BackendResult> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio);
        debug!(audio_bytes = audio.len(), encoded_len = encoded.len(), "sending audio to gemini");
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "audio/wav".to_string(),
                            data: encoded,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "text/plain",
            },
        };
        let response = self.generate(&request).await?;
        Ok(to_backend_result(response))
    }

    async fn probe(&self) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: PROBE_PROMPT.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "text/plain",
            },
        };
        let response = self.generate(&request).await?;
        match to_backend_result(response).text {
            Ok(text) => Ok(text.trim().to_string()),
            Err(failure) => Err(anyhow!("probe returned no text: {}", failure.detail)),
        }
    }
}

/// Reduces the wire response to the classifier capability.
fn to_backend_result(response: GenerateContentResponse) -> BackendResult {
    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);
    let finish_reason = response
        .candidates
        .first()
        .and_then(|c| c.finish_reason.clone());
    let text = extract_text(&response.candidates, finish_reason.as_deref());
    BackendResult {
        block_reason,
        finish_reason,
        text,
    }
}

fn extract_text(
    candidates: &[Candidate],
    finish_reason: Option<&str>,
) -> Result<String, ExtractionFailure> {
    let Some(first) = candidates.first() else {
        return Err(ExtractionFailure {
            detail: "response contained no candidates".to_string(),
            content_related: false,
        });
    };
    let parts: Vec<&str> = first
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();
    if parts.is_empty() {
        // Mirrors the SDK behavior where asking for text raises when the
        // candidate has no valid parts; a finish reason points at a content
        // cause rather than a broken response.
        let content_related = finish_reason.is_some_and(|r| r != "STOP");
        return Err(ExtractionFailure {
            detail: match finish_reason {
                Some(reason) => {
                    format!("candidate has no text parts (finish reason {reason})")
                }
                None => "candidate has no text parts".to_string(),
            },
            content_related,
        });
    }
    Ok(parts.concat())
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_inline_data() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: "transcribe".into(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "audio/wav".into(),
                            data: "QUJD".into(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "text/plain",
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "transcribe");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "audio/wav"
        );
        assert_eq!(json["generationConfig"]["responseMimeType"], "text/plain");
    }

    #[test]
    fn successful_response_maps_to_extractable_text() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{"text": "Hallo "}, {"text": "Welt"}], "role": "model" },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let result = to_backend_result(response);
        assert_eq!(result.block_reason, None);
        assert_eq!(result.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(result.text.unwrap(), "Hallo Welt");
    }

    #[test]
    fn prompt_feedback_block_is_surfaced() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let result = to_backend_result(response);
        assert_eq!(result.block_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn recitation_without_parts_is_content_related() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "finishReason": "RECITATION" }]
        }))
        .unwrap();
        let result = to_backend_result(response);
        assert_eq!(result.finish_reason.as_deref(), Some("RECITATION"));
        let failure = result.text.unwrap_err();
        assert!(failure.content_related);
        assert!(failure.detail.contains("RECITATION"));
    }

    #[test]
    fn missing_candidates_is_not_content_related() {
        let response: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({})).unwrap();
        let failure = to_backend_result(response).text.unwrap_err();
        assert!(!failure.content_related);
        assert!(failure.detail.contains("no candidates"));
    }

    #[test]
    fn new_requires_an_api_key() {
        let err = GeminiBackend::new("", "models/gemini-2.5-flash", 0.0, None).unwrap_err();
        assert!(err.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn new_normalizes_bare_model_names_and_base_override() {
        let backend = GeminiBackend::new(
            "key",
            "gemini-2.5-flash",
            0.0,
            Some("http://localhost:9999/"),
        )
        .unwrap();
        assert_eq!(
            backend.endpoint,
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn new_rejects_an_invalid_base_override() {
        let err = GeminiBackend::new("key", "m", 0.0, Some("not a url")).unwrap_err();
        assert!(err.contains("Invalid API base"));
    }
}
