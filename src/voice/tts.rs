//! Speech synthesis via the Cartesia API
//!
//! Returns raw 16-bit LE PCM at the session sample rate so the result can be
//! framed straight onto the media stream without resampling.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synthesizes speech from text
pub struct Synthesizer {
    client: Client,
    api_key: SecretString,
    url: String,
    model: String,
    voice_id: String,
    version: String,
    sample_rate: u32,
}

impl Synthesizer {
    /// Create a new synthesizer producing PCM at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing.
    pub fn new(config: &TtsConfig, sample_rate: u32) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "Cartesia API key required for synthesis".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice_id: config.voice_id.clone(),
            version: config.version.clone(),
            sample_rate,
        })
    }

    /// Synthesize text to raw 16-bit LE PCM
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the provider rejects it.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = SynthesisRequest {
            model_id: &self.model,
            transcript: text,
            voice: VoiceRef {
                mode: "id",
                id: &self.voice_id,
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_s16le",
                sample_rate: self.sample_rate,
            },
        };

        let response = self
            .client
            .post(format!("{}/tts/bytes", self.url))
            .header("X-API-Key", self.api_key.expose_secret())
            .header("Cartesia-Version", &self.version)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("synthesis request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Cartesia API error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(format!("failed to read synthesis audio: {e}")))?;

        Ok(audio.to_vec())
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceRef<'a>,
    output_format: OutputFormat,
}

#[derive(Serialize)]
struct VoiceRef<'a> {
    mode: &'static str,
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}
