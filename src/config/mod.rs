//! Configuration management for the Exovoice gateway

pub mod file;

use secrecy::SecretString;

use crate::{Error, Result};

/// Default greeting spoken as soon as the media stream starts
pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

/// Default system prompt for the conversation LLM
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant on a phone call. \
     Keep your responses short and conversational. The caller hears your words as speech, \
     so avoid lists, markdown, and special characters.";

/// Gateway configuration, loaded once at startup and shared via `Arc`
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/websocket server configuration
    pub server: ServerConfig,

    /// Exotel account, credentials, and API endpoint
    pub exotel: ExotelConfig,

    /// Outbound call policy (number validation, timeouts)
    pub outbound: OutboundConfig,

    /// Per-call session behavior
    pub session: SessionConfig,

    /// Streaming speech-to-text (Deepgram live API)
    pub speech: SpeechConfig,

    /// Chat completion (OpenAI-compatible API)
    pub llm: LlmConfig,

    /// Speech synthesis (Cartesia)
    pub tts: TtsConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind (default `0.0.0.0`)
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

/// Exotel account and credentials
///
/// All credential fields are required at startup; the outbound trigger
/// re-validates them before any network call.
#[derive(Debug, Clone)]
pub struct ExotelConfig {
    /// API key (basic auth username)
    pub api_key: SecretString,

    /// API token (basic auth password)
    pub api_token: SecretString,

    /// Account SID, part of every API path
    pub account_sid: String,

    /// Caller ID shown to the dialed party (an ExoPhone number)
    pub caller_id: String,

    /// Identifier of the pre-built voice app (flow) in the Exotel dashboard
    pub app_id: String,

    /// API subdomain, e.g. `api.exotel.com` or `api.in.exotel.com`
    pub subdomain: String,

    /// Full API base URL, normally derived from `subdomain`.
    /// Overridable via `EXOTEL_API_BASE` for staging targets.
    pub api_base: String,
}

impl ExotelConfig {
    /// URL of the pre-existing voice app the connected call is bridged to
    #[must_use]
    pub fn voice_app_url(&self) -> String {
        format!(
            "http://my.exotel.com/{}/exoml/start_voice/{}",
            self.account_sid, self.app_id
        )
    }
}

/// Outbound call policy
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    /// Require destination numbers in E.164 format (leading `+`)
    pub require_e164: bool,

    /// Allowed country-code prefixes (e.g. `+91`). Empty = allow all.
    pub allowed_country_codes: Vec<String>,

    /// Fallback `CustomField` value when the request carries none
    pub default_custom_field: Option<String>,

    /// Seconds to ring before giving up (`TimeOut`)
    pub ring_timeout_secs: u64,

    /// Maximum call duration in seconds (`TimeLimit`)
    pub time_limit_secs: u64,
}

impl OutboundConfig {
    /// Check a destination number against the dialing policy.
    /// The rejection message is meant for API responses as-is.
    ///
    /// # Errors
    ///
    /// Returns the rejection message when the number violates the policy.
    pub fn validate_number(&self, number: &str) -> std::result::Result<(), String> {
        if self.require_e164 && !number.starts_with('+') {
            return Err("Phone number must be in E.164 format (starting with +)".to_string());
        }

        // Empty allow-list means any country is accepted
        if !self.allowed_country_codes.is_empty()
            && !self
                .allowed_country_codes
                .iter()
                .any(|code| number.starts_with(code.as_str()))
        {
            return Err(format!(
                "Phone number must start with one of: {}",
                self.allowed_country_codes.join(", ")
            ));
        }

        Ok(())
    }
}

/// Per-call session behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// PCM sample rate of the media stream, both directions (Exotel: 8000)
    pub sample_rate: u32,

    /// Allow the caller to barge in over bot speech
    pub enable_interruptions: bool,

    /// Greeting spoken before any caller input
    pub greeting: String,

    /// System prompt seeding every conversation transcript
    pub system_prompt: String,
}

/// Streaming speech-to-text configuration (Deepgram live API)
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Deepgram API key
    pub api_key: SecretString,

    /// Websocket endpoint (default `wss://api.deepgram.com/v1/listen`)
    pub url: String,

    /// Model identifier (e.g. `nova-2`)
    pub model: String,

    /// BCP-47 language tag (e.g. `en`)
    pub language: String,

    /// Request server-side speech-start/utterance-end events.
    /// Turn-taking and barge-in both hang off these.
    pub vad_enabled: bool,

    /// Silence window (ms) before an `UtteranceEnd` event is emitted
    pub utterance_end_ms: u32,

    /// Endpointing silence threshold in ms (finalizes a turn)
    pub endpointing_ms: u32,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub api_key: SecretString,

    /// API base URL (default `https://api.openai.com/v1`)
    pub url: String,

    /// Model identifier (e.g. `gpt-4o-mini`)
    pub model: String,
}

/// Speech synthesis configuration (Cartesia)
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Cartesia API key
    pub api_key: SecretString,

    /// API base URL (default `https://api.cartesia.ai`)
    pub url: String,

    /// Model identifier (e.g. `sonic-2`)
    pub model: String,

    /// Voice identifier from the Cartesia voice library
    pub voice_id: String,

    /// `Cartesia-Version` header value
    pub version: String,
}

impl Config {
    /// Load configuration from the environment with an optional TOML overlay
    /// (env > toml > default). Secrets come from the environment only.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming every missing required variable.
    pub fn from_env() -> Result<Self> {
        let fc = file::load_config_file();

        let mut missing = Vec::new();
        let exotel_api_key = require_env("EXOTEL_API_KEY", &mut missing);
        let exotel_api_token = require_env("EXOTEL_API_TOKEN", &mut missing);
        let exotel_account_sid = require_env("EXOTEL_ACCOUNT_SID", &mut missing);
        let exotel_caller_id = require_env("EXOTEL_CALLER_ID", &mut missing);
        let exotel_app_id = require_env("EXOTEL_APP_ID", &mut missing);
        let deepgram_api_key = require_env("DEEPGRAM_API_KEY", &mut missing);
        let openai_api_key = require_env("OPENAI_API_KEY", &mut missing);
        let cartesia_api_key = require_env("CARTESIA_API_KEY", &mut missing);

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(8765),
        };

        let subdomain = std::env::var("EXOTEL_SUBDOMAIN")
            .ok()
            .unwrap_or_else(|| "api.exotel.com".to_string());
        let api_base = std::env::var("EXOTEL_API_BASE")
            .ok()
            .unwrap_or_else(|| format!("https://{subdomain}"));
        let exotel = ExotelConfig {
            api_key: SecretString::from(exotel_api_key),
            api_token: SecretString::from(exotel_api_token),
            account_sid: exotel_account_sid,
            caller_id: exotel_caller_id,
            app_id: exotel_app_id,
            subdomain,
            api_base,
        };

        let outbound = OutboundConfig {
            require_e164: env_flag("REQUIRE_E164_FORMAT")
                .or(fc.outbound.require_e164)
                .unwrap_or(true),
            allowed_country_codes: std::env::var("ALLOWED_COUNTRY_CODES")
                .ok()
                .map(|s| parse_list(&s))
                .or(fc.outbound.allowed_country_codes)
                .unwrap_or_default(),
            default_custom_field: std::env::var("DEFAULT_CUSTOM_FIELD")
                .ok()
                .or(fc.outbound.default_custom_field),
            ring_timeout_secs: std::env::var("RING_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.outbound.ring_timeout_secs)
                .unwrap_or(30),
            time_limit_secs: std::env::var("CALL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.outbound.time_limit_secs)
                .unwrap_or(3600),
        };

        let session = SessionConfig {
            sample_rate: std::env::var("SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.session.sample_rate)
                .unwrap_or(8000),
            enable_interruptions: env_flag("ENABLE_INTERRUPTIONS")
                .or(fc.session.enable_interruptions)
                .unwrap_or(true),
            greeting: std::env::var("GREETING_MESSAGE")
                .ok()
                .or(fc.session.greeting)
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            system_prompt: std::env::var("SYSTEM_PROMPT")
                .ok()
                .or(fc.session.system_prompt)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let speech = SpeechConfig {
            api_key: SecretString::from(deepgram_api_key),
            url: std::env::var("DEEPGRAM_URL")
                .ok()
                .unwrap_or_else(|| "wss://api.deepgram.com/v1/listen".to_string()),
            model: std::env::var("STT_MODEL")
                .ok()
                .or(fc.speech.model)
                .unwrap_or_else(|| "nova-2".to_string()),
            language: std::env::var("STT_LANGUAGE")
                .ok()
                .or(fc.speech.language)
                .unwrap_or_else(|| "en".to_string()),
            vad_enabled: env_flag("VAD_ENABLED")
                .or(fc.speech.vad_enabled)
                .unwrap_or(true),
            utterance_end_ms: std::env::var("UTTERANCE_END_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.speech.utterance_end_ms)
                .unwrap_or(1000),
            endpointing_ms: std::env::var("STT_ENDPOINTING_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.speech.endpointing_ms)
                .unwrap_or(300),
        };

        let llm = LlmConfig {
            api_key: SecretString::from(openai_api_key),
            url: std::env::var("OPENAI_URL")
                .ok()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_MODEL")
                .ok()
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        };

        let tts = TtsConfig {
            api_key: SecretString::from(cartesia_api_key),
            url: std::env::var("CARTESIA_URL")
                .ok()
                .unwrap_or_else(|| "https://api.cartesia.ai".to_string()),
            model: std::env::var("TTS_MODEL")
                .ok()
                .or(fc.tts.model)
                .unwrap_or_else(|| "sonic-2".to_string()),
            voice_id: std::env::var("TTS_VOICE_ID")
                .ok()
                .or(fc.tts.voice_id)
                .unwrap_or_else(|| "71a7ad14-091c-4e8e-a314-022ece01c121".to_string()),
            version: std::env::var("CARTESIA_VERSION")
                .ok()
                .unwrap_or_else(|| "2024-06-10".to_string()),
        };

        Ok(Self {
            server,
            exotel,
            outbound,
            session,
            speech,
            llm,
            tts,
        })
    }
}

/// Read a required variable, recording its name when absent or blank
fn require_env(name: &'static str, missing: &mut Vec<&'static str>) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

/// Parse a boolean flag from the environment (`1`/`true`/`yes`, case-insensitive)
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
    })
}

/// Split a comma-separated list, trimming whitespace and dropping empties
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
