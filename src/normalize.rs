use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::temp::{ScratchScope, Stage};

/// Fixed conversion parameters, selected per backend variant. Never derived
/// from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationSpec {
    pub sample_rate: u32,
    pub channels: u8,
    /// Explicit output codec; `None` lets the WAV muxer pick its default.
    pub codec: Option<&'static str>,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("ffmpeg not found. Install ffmpeg and ensure it is on PATH.")]
    ToolMissing,
    #[error("Audio conversion failed: {0}")]
    Failed(String),
    #[error("Failed to run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Narrow seam over the external conversion tool so tests can substitute a
/// deterministic fake.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Converts `input` into a canonical mono PCM WAV inside a fresh
    /// `normalized`-stage scratch file and returns its path.
    async fn normalize(
        &self,
        scope: &mut ScratchScope,
        input: &Path,
        spec: &NormalizationSpec,
    ) -> Result<PathBuf, NormalizeError>;

    /// Whether the underlying tool is present on the host. Feeds the
    /// readiness check.
    fn is_available(&self) -> bool {
        true
    }
}

pub struct FfmpegNormalizer {
    binary: Option<PathBuf>,
}

impl FfmpegNormalizer {
    /// Resolves the ffmpeg binary once at startup, preferring an explicit
    /// override over a PATH scan. A missing tool is reported per request and
    /// through the health endpoint, not at boot.
    pub fn discover(override_path: Option<PathBuf>) -> Self {
        let binary = override_path.or_else(find_in_path);
        match &binary {
            Some(path) => debug!(path = %path.display(), "located ffmpeg"),
            None => debug!("ffmpeg not found on PATH"),
        }
        Self { binary }
    }

    #[cfg(test)]
    pub fn with_binary(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }
}

pub fn find_in_path() -> Option<PathBuf> {
    let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// The argument shape is fixed; user data only ever enters as the input and
/// output paths, so nothing the client sends can inject extra flags.
fn build_args(input: &Path, spec: &NormalizationSpec, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-ar".into(),
        spec.sample_rate.to_string().into(),
        "-ac".into(),
        spec.channels.to_string().into(),
        "-f".into(),
        "wav".into(),
    ];
    if let Some(codec) = spec.codec {
        args.push("-acodec".into());
        args.push(codec.into());
    }
    args.push("-loglevel".into());
    args.push("error".into());
    args.push(output.as_os_str().to_os_string());
    args
}

#[async_trait]
impl Normalizer for FfmpegNormalizer {
    async fn normalize(
        &self,
        scope: &mut ScratchScope,
        input: &Path,
        spec: &NormalizationSpec,
    ) -> Result<PathBuf, NormalizeError> {
        // Checked before the output resource is acquired: a missing tool is
        // an environment fault, not a conversion failure.
        let binary = self.binary.as_ref().ok_or(NormalizeError::ToolMissing)?;
        let output = scope.acquire(Stage::Normalized, ".wav");

        let result = Command::new(binary)
            .args(build_args(input, spec, &output))
            .output()
            .await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                result.status.to_string()
            } else {
                stderr
            };
            return Err(NormalizeError::Failed(detail));
        }
        debug!(output = %output.display(), sample_rate = spec.sample_rate, "converted audio to wav");
        Ok(output)
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }
}
