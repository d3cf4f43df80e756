use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error returned straight from a handler, before the pipeline produces an
/// [`Outcome`](crate::outcome::Outcome) — malformed multipart bodies, an
/// uninitialized backend client and the like.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: ErrorBody,
}

/// JSON error envelope shared by every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    detail: String,
}

impl From<String> for ErrorBody {
    fn from(detail: String) -> Self {
        ErrorBody { detail }
    }
}

impl From<&str> for ErrorBody {
    fn from(detail: &str) -> Self {
        ErrorBody {
            detail: detail.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: ErrorBody::from(err.into().to_string()),
        }
    }
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            message: ErrorBody::from(detail.into()),
        }
    }
}

pub type ApiResult<T, E = ApiError> = Result<T, E>;

#[macro_export]
macro_rules! bail_api {
    ($error_message:expr) => {
        return Err($crate::error::ApiError { status: axum::http::StatusCode::INTERNAL_SERVER_ERROR, message: $crate::error::ErrorBody::from($error_message) })
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::ApiError { status: $status_code, message: $crate::error::ErrorBody::from($error_message) })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::ApiError {
            status: $status,
            message: $crate::error::ErrorBody::from(format!($fmt $(, $arg)*)),
        })
    };
}
