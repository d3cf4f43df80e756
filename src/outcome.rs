use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ErrorBody;

/// The closed set of terminal results a transcription attempt can produce.
/// Exactly one variant is populated per request; a success text never rides
/// along with an error detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Non-empty recognized text.
    Success { text: String },
    /// The backend refused to return text due to content policy.
    Blocked {
        reason: String,
        guidance: Option<String>,
    },
    /// Generation stopped early for a non-blocking reason (length limit,
    /// safety truncation).
    Incomplete { reason: String },
    /// The call completed but yielded no text.
    Empty,
    /// The call did not complete within the enforced deadline.
    Timeout,
    /// Network, SDK or API-level failure.
    TransportError { detail: String },
    /// The normalization subprocess failed.
    ConversionError { detail: String },
    /// Malformed, empty or unsupported input detected before invocation.
    ValidationError { detail: String },
    /// Permanent environment fault: backend client not initialized, the
    /// conversion tool missing from the host, or an unexpected internal
    /// error. Never caused by the uploaded clip itself.
    Unavailable { detail: String },
}

#[derive(Debug, Serialize)]
struct TranscriptionBody {
    text: String,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Success { .. } => StatusCode::OK,
            Outcome::ValidationError { .. } | Outcome::ConversionError { .. } => {
                StatusCode::BAD_REQUEST
            }
            Outcome::Blocked { .. } | Outcome::Incomplete { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Outcome::Empty | Outcome::TransportError { .. } => StatusCode::BAD_GATEWAY,
            Outcome::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Outcome::Unavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail for every non-success variant.
    pub fn detail(&self) -> String {
        match self {
            Outcome::Success { .. } => String::new(),
            Outcome::Blocked {
                reason,
                guidance: Some(guidance),
            } => format!("Transcription blocked ({reason}): {guidance}"),
            Outcome::Blocked {
                reason,
                guidance: None,
            } => format!("The backend blocked the request: {reason}"),
            Outcome::Incomplete { reason } => format!("Transcription incomplete: {reason}"),
            Outcome::Empty => "The backend returned an empty transcription".to_string(),
            Outcome::Timeout => {
                "Transcription service timed out before producing a result".to_string()
            }
            Outcome::TransportError { detail }
            | Outcome::ConversionError { detail }
            | Outcome::ValidationError { detail }
            | Outcome::Unavailable { detail } => detail.clone(),
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Success { text } => {
                (StatusCode::OK, Json(TranscriptionBody { text })).into_response()
            }
            other => {
                let status = other.status();
                let mut res = Json(ErrorBody::from(other.detail())).into_response();
                *res.status_mut() = status;
                res
            }
        }
    }
}
