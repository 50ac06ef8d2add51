use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::read_to_string;

pub const CONFIG_FILE: &str = "Config.toml";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly virtual assistant. \
Answer clearly, accurately and concisely. Be kind and professional at all times. \
Format your answers with Markdown when it helps readability.";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Default audio device of the host
    Device,

    /// One WAV file per utterance in `wav_dir`
    Wav,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub kind: OutputKind,
    pub wav_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            kind: OutputKind::Device,
            wav_dir: PathBuf::from("speech"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base_url: String,
    pub chat_model: String,
    pub tts_model: String,
    pub voice_name: String,
    pub system_instruction: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice_name: "Kore".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub gemini: GeminiConfig,

    /// File holding the persisted API key
    pub credential_file: PathBuf,

    /// Locale used for speech capture
    pub locale: String,

    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gemini: GeminiConfig::default(),
            credential_file: PathBuf::from("credentials.json"),
            locale: "es-ES".to_string(),
            output: OutputConfig::default(),
        }
    }
}

pub fn parse(config: &str) -> Result<Config> {
    let config: Config = toml::from_str(config)?;
    Ok(config)
}

pub async fn load_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    let config = match read_to_string(path).await {
        Ok(config) => config,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No {} found, using default configuration", path.display());
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    parse(&config).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn load() -> Result<Config> {
    load_from(CONFIG_FILE).await
}
