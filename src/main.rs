use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use clap_serde_derive::ClapSerde;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::backend::gemini::GeminiBackend;
use crate::backend::invoker::{self, PROBE_DEADLINE};
use crate::backend::speech::SpeechBackend;
use crate::backend::TranscriptionBackend;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::ingest::UploadedAudio;
use crate::normalize::{FfmpegNormalizer, Normalizer};
use crate::outcome::Outcome;

mod backend;
mod config;
mod error;
mod ingest;
mod normalize;
mod outcome;
mod pipeline;
mod prompts;
mod temp;

/// Origins of the local learning frontends this service backs.
const ALLOWED_ORIGINS: [&str; 7] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:5500",
    "http://127.0.0.1:5500",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
    "null",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = "SpeechRelay.toml")]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

/// Shared, read-only per-process state. The backend handle is built once at
/// startup; an initialization failure is held as a permanent error string
/// and reported by /health and every transcription request.
struct AppState {
    backend: Result<Arc<dyn TranscriptionBackend>, String>,
    normalizer: Arc<dyn Normalizer>,
    deadline: Duration,
    model: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match Config::from_toml(&args.config_file) {
        Ok(conf) => conf.merge(args.opt_config),
        Err(err) => {
            if args.config_file == "SpeechRelay.toml" {
                Config::default().merge(args.opt_config)
            } else {
                exit_err!(
                    1,
                    "Failed to read configuration file {} with error: {}",
                    args.config_file,
                    err
                );
            }
        }
    };

    let ffmpeg_override = non_empty(&config.ffmpeg_path).map(PathBuf::from);
    let normalizer = FfmpegNormalizer::discover(ffmpeg_override);
    if !normalizer.is_available() {
        error!("ffmpeg not found on PATH; transcription requests will fail until it is installed");
    }

    let backend = build_backend(&config);
    match &backend {
        Ok(backend) => info!(backend = backend.name(), model = %config.model, "backend client initialized"),
        Err(detail) => error!(%detail, "backend client failed to initialize"),
    }

    let state = Arc::new(AppState {
        backend,
        normalizer: Arc::new(normalizer),
        deadline: Duration::from_secs(config.request_timeout_secs),
        model: config.model.clone(),
    });

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_backend(config: &Config) -> Result<Arc<dyn TranscriptionBackend>, String> {
    match config.backend.as_str() {
        "gemini" => GeminiBackend::new(
            &config.api_key,
            &config.model,
            config.temperature,
            non_empty(&config.api_base),
        )
        .map(|backend| Arc::new(backend) as Arc<dyn TranscriptionBackend>),
        "speech" => SpeechBackend::new(
            &config.api_key,
            &config.language,
            &config.recognition_model,
            non_empty(&config.api_base),
        )
        .map(|backend| Arc::new(backend) as Arc<dyn TranscriptionBackend>),
        other => exit_err!(1, "Unknown backend {}, expected gemini or speech", other),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .map(|origin| HeaderValue::from_static(origin))
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_router = Router::new()
        .route("/transcribe", post(handle_transcribe))
        .route("/transcribe-educational", post(handle_transcribe_educational))
        // 25 MB limit
        .layer(DefaultBodyLimit::max(25_000_000));

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/test-backend", get(handle_probe))
        .merge(upload_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// TODO set timeout for shutdown signal
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

#[axum_macros::debug_handler]
async fn handle_root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "German Audio Transcription API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/health": "Health check",
            "/test-backend": "Test backend API connection",
            "/transcribe": "POST - Upload audio for transcription",
            "/transcribe-educational": "POST - Educational transcription with fair use emphasis",
        },
        "model": state.model,
        "status": "running",
    }))
}

#[axum_macros::debug_handler]
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    if let Err(detail) = &state.backend {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "detail": detail})),
        )
            .into_response();
    }
    if !state.normalizer.is_available() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "detail": "ffmpeg not found. Install ffmpeg and ensure it is on PATH.",
            })),
        )
            .into_response();
    }
    Json(json!({"status": "ok"})).into_response()
}

#[axum_macros::debug_handler]
async fn handle_probe(State(state): State<Arc<AppState>>) -> Response {
    let backend = match &state.backend {
        Ok(backend) => backend.clone(),
        Err(detail) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "detail": detail})),
            )
                .into_response()
        }
    };
    match invoker::probe_with_deadline(backend, PROBE_DEADLINE).await {
        Outcome::Success { text } => {
            Json(json!({"status": "ok", "test_response": text})).into_response()
        }
        Outcome::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"status": "timeout", "detail": "Backend probe timed out"})),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "detail": other.detail()})),
        )
            .into_response(),
    }
}

#[axum_macros::debug_handler]
async fn handle_transcribe(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Response> {
    transcribe_with_prompt(state, multipart, prompts::DEFAULT_PROMPT).await
}

#[axum_macros::debug_handler]
async fn handle_transcribe_educational(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Response> {
    transcribe_with_prompt(state, multipart, prompts::EDUCATIONAL_PROMPT).await
}

async fn transcribe_with_prompt(
    state: Arc<AppState>,
    multipart: Multipart,
    prompt: &str,
) -> ApiResult<Response> {
    let backend = match &state.backend {
        Ok(backend) => backend.clone(),
        Err(detail) => bail_api!(StatusCode::INTERNAL_SERVER_ERROR, "{}", detail),
    };
    let upload = read_upload(multipart).await?;
    let outcome = pipeline::transcribe(
        backend,
        state.normalizer.as_ref(),
        state.deadline,
        upload,
        prompt,
    )
    .await;
    Ok(outcome.into_response())
}

/// Pulls the single `audio` file field out of the multipart form.
async fn read_upload(mut multipart: Multipart) -> ApiResult<UploadedAudio> {
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };
        match name.as_str() {
            "audio" => {
                let filename = field.file_name().map(ToString::to_string);
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
                return Ok(UploadedAudio {
                    bytes,
                    filename,
                    content_type,
                });
            }
            other => bail_api!(
                StatusCode::BAD_REQUEST,
                "Unknown field {} in multipart form",
                other
            ),
        }
    }
    bail_api!(
        StatusCode::BAD_REQUEST,
        "Missing field audio in multipart form"
    )
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        format!("Invalid multipart body: {err}"),
    )
}

#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            tracing::error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}
