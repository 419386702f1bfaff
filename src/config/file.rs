//! TOML configuration file loading
//!
//! Supports `~/.config/omni/exovoice/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay underneath the
//! environment. Credentials never come from the file.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// Server bind configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Outbound call policy
    #[serde(default)]
    pub outbound: OutboundFileConfig,

    /// Call session behavior
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech-to-text tuning
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Chat completion tuning
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis tuning
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// Server bind configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Interface to bind
    pub host: Option<String>,

    /// Port to listen on
    pub port: Option<u16>,
}

/// Outbound call policy
#[derive(Debug, Default, Deserialize)]
pub struct OutboundFileConfig {
    /// Require E.164 destination numbers
    pub require_e164: Option<bool>,

    /// Allowed country-code prefixes (empty = allow all)
    pub allowed_country_codes: Option<Vec<String>>,

    /// Fallback `CustomField` value
    pub default_custom_field: Option<String>,

    /// Ring timeout in seconds
    pub ring_timeout_secs: Option<u64>,

    /// Maximum call duration in seconds
    pub time_limit_secs: Option<u64>,
}

/// Call session behavior
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Media stream sample rate
    pub sample_rate: Option<u32>,

    /// Allow barge-in over bot speech
    pub enable_interruptions: Option<bool>,

    /// Greeting text
    pub greeting: Option<String>,

    /// Conversation system prompt
    pub system_prompt: Option<String>,
}

/// Speech-to-text tuning
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Model identifier (e.g. "nova-2")
    pub model: Option<String>,

    /// Language tag (e.g. "en")
    pub language: Option<String>,

    /// Request speech-start/utterance-end events
    pub vad_enabled: Option<bool>,

    /// Utterance-end silence window in ms
    pub utterance_end_ms: Option<u32>,

    /// Endpointing silence threshold in ms
    pub endpointing_ms: Option<u32>,
}

/// Chat completion tuning
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,
}

/// Speech synthesis tuning
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Model identifier (e.g. "sonic-2")
    pub model: Option<String>,

    /// Voice identifier
    pub voice_id: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GatewayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> GatewayConfigFile {
    let Some(path) = config_file_path() else {
        return GatewayConfigFile::default();
    };

    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GatewayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/exovoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("exovoice")
            .join("config.toml")
    })
}
