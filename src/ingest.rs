use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::temp::{ScratchScope, Stage};

/// A fully read upload, as it arrived on the wire.
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Uploaded audio file is empty")]
    EmptyBody,
    #[error("Unsupported content type {0}. Expected audio file.")]
    UnsupportedContentType(String),
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Filename extensions stored under their own suffix; everything else falls
/// back to the content-type probe, then to `.webm`.
const ALLOWED_EXTENSIONS: [&str; 6] = ["mp4", "m4a", "mp3", "wav", "webm", "ogg"];

/// Writes the upload to a fresh `input`-stage scratch file and returns its
/// path. Rejects empty bodies and non-audio content types before any scratch
/// resource is allocated.
pub async fn ingest(
    scope: &mut ScratchScope,
    upload: &UploadedAudio,
) -> Result<PathBuf, IngestError> {
    if upload.bytes.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    if let Some(content_type) = upload.content_type.as_deref() {
        if !is_supported_content_type(content_type) {
            return Err(IngestError::UnsupportedContentType(content_type.to_string()));
        }
    }

    let suffix = storage_suffix(upload.filename.as_deref(), upload.content_type.as_deref());
    let path = scope.acquire(Stage::Input, suffix);
    tokio::fs::write(&path, &upload.bytes).await?;
    debug!(path = %path.display(), size = upload.bytes.len(), "stored upload");
    Ok(path)
}

/// Browsers upload recordings as audio/* or as mp4/webm video containers.
fn is_supported_content_type(content_type: &str) -> bool {
    content_type.starts_with("audio")
        || content_type.starts_with("video/mp4")
        || content_type.starts_with("video/webm")
}

/// Storage suffix precedence: allow-listed filename extension, then a
/// substring probe of the declared content type, then `.webm` (the format
/// browsers default to for microphone captures).
pub fn storage_suffix(filename: Option<&str>, content_type: Option<&str>) -> &'static str {
    if let Some(ext) = filename.and_then(|name| name.rsplit_once('.').map(|(_, e)| e)) {
        let ext = ext.to_ascii_lowercase();
        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return match ext.as_str() {
                "mp4" => ".mp4",
                "m4a" => ".m4a",
                "mp3" => ".mp3",
                "wav" => ".wav",
                "ogg" => ".ogg",
                _ => ".webm",
            };
        }
    }
    if let Some(content_type) = content_type {
        if content_type.contains("mp4") {
            return ".mp4";
        } else if content_type.contains("mpeg") {
            return ".mp3";
        } else if content_type.contains("wav") {
            return ".wav";
        } else if content_type.contains("ogg") {
            return ".ogg";
        }
    }
    ".webm"
}
