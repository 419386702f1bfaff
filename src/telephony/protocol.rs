//! Exotel media stream wire protocol
//!
//! Every frame on the stream websocket is a UTF-8 JSON text message tagged by
//! an `event` field. Caller audio arrives as base64 16-bit little-endian PCM
//! chunks; bot audio is sent back the same way, split into 20 ms frames.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Duration of one outbound audio frame in milliseconds
pub const FRAME_MS: u32 = 20;

/// Incoming message on the media stream
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Handshake acknowledgment, first frame after connect
    Connected,

    /// Stream metadata; marks the beginning of the media session.
    /// Both ids are optional on the wire so their absence can be reported
    /// instead of failing the whole parse.
    Start {
        #[serde(default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartInfo>,
    },

    /// One chunk of caller audio
    Media { media: MediaInfo },

    /// Keypad digit pressed by the caller
    Dtmf { dtmf: DtmfInfo },

    /// Playback watermark echoed back by the provider
    Mark {
        #[serde(default)]
        mark: Option<MarkInfo>,
    },

    /// End of the stream
    Stop {
        #[serde(default)]
        stop: Option<StopInfo>,
    },

    /// Any event this gateway does not act on
    #[serde(other)]
    Unhandled,
}

/// Metadata carried by the `start` event
#[derive(Debug, Clone, Deserialize)]
pub struct StartInfo {
    /// Provider call identifier
    #[serde(default)]
    pub call_sid: Option<String>,

    /// Account the call belongs to
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Calling party number
    #[serde(default)]
    pub from: Option<String>,

    /// Called party number
    #[serde(default)]
    pub to: Option<String>,
}

/// Audio payload of a `media` event
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    /// Base64-encoded 16-bit LE PCM
    pub payload: String,

    /// Sequence number within the stream
    #[serde(default)]
    pub chunk: Option<serde_json::Value>,

    /// Milliseconds since stream start
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MediaInfo {
    /// Decode the base64 payload into raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns a telephony error if the payload is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|e| Error::Telephony(format!("invalid media payload: {e}")))
    }
}

/// Payload of a `dtmf` event
#[derive(Debug, Clone, Deserialize)]
pub struct DtmfInfo {
    /// Digit pressed (`0`-`9`, `*`, `#`)
    pub digit: String,

    /// Press duration in ms
    #[serde(default)]
    pub duration: Option<String>,
}

/// Payload of a `mark` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkInfo {
    /// Watermark name chosen by the sender
    pub name: String,
}

/// Payload of a `stop` event
#[derive(Debug, Clone, Deserialize)]
pub struct StopInfo {
    /// Provider call identifier
    #[serde(default)]
    pub call_sid: Option<String>,

    /// Why the stream ended (e.g. `callended`)
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outgoing message on the media stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One frame of bot audio
    Media {
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Flush the provider's playback buffer (barge-in)
    Clear { stream_sid: String },

    /// Playback watermark, echoed back once the audio before it has played
    Mark { stream_sid: String, mark: MarkInfo },
}

/// Audio payload of an outgoing `media` frame
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    /// Base64-encoded 16-bit LE PCM
    pub payload: String,
}

impl OutboundFrame {
    /// Build a `media` frame from raw PCM bytes
    #[must_use]
    pub fn media(stream_sid: &str, pcm: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: base64::engine::general_purpose::STANDARD.encode(pcm),
            },
        }
    }

    /// Build a `clear` frame
    #[must_use]
    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    /// Build a `mark` frame
    #[must_use]
    pub fn mark(stream_sid: &str, name: &str) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkInfo {
                name: name.to_string(),
            },
        }
    }

    /// Serialize to the JSON text the provider expects
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Bytes in one outbound frame at the given sample rate (16-bit mono)
#[must_use]
pub fn frame_bytes(sample_rate: u32) -> usize {
    (sample_rate / 1000 * FRAME_MS) as usize * 2
}

/// Split synthesized PCM into provider-sized frames.
/// The trailing partial frame is kept as-is.
pub fn audio_frames(pcm: &[u8], sample_rate: u32) -> impl Iterator<Item = &[u8]> {
    pcm.chunks(frame_bytes(sample_rate).max(2))
}
