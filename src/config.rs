use anyhow::Result;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub(crate) address: String,

    /// The port the listener binds to
    #[arg(short, long, env, default_value = "8000")]
    pub(crate) port: u16,

    /// Transcription backend: "gemini" or "speech"
    #[arg(short, long, env, default_value = "gemini")]
    pub(crate) backend: String,

    /// API key for the transcription backend
    #[arg(long, env = "GEMINI_API_KEY", default_value = "")]
    pub(crate) api_key: String,

    /// Model for the multimodal backend
    #[arg(long, env = "GEMINI_MODEL", default_value = "models/gemini-2.5-flash")]
    pub(crate) model: String,

    /// Sampling temperature for the multimodal backend
    #[arg(long, env = "GEMINI_TEMPERATURE", default_value = "0.0")]
    pub(crate) temperature: f32,

    /// API base override; empty means the backend default
    #[arg(long, env = "GENERATIVE_API_BASE", default_value = "")]
    pub(crate) api_base: String,

    /// BCP-47 language code for the dedicated recognizer
    #[arg(long, env, default_value = "de-DE")]
    pub(crate) language: String,

    /// Model for the dedicated recognizer
    #[arg(long, env, default_value = "latest_long")]
    pub(crate) recognition_model: String,

    /// Hard deadline for one backend call, in seconds
    #[arg(long, env, default_value = "30")]
    pub(crate) request_timeout_secs: u64,

    /// Path to the ffmpeg binary; empty means discover it on PATH
    #[arg(long, env, default_value = "")]
    pub(crate) ffmpeg_path: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }
}
