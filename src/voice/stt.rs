//! Streaming speech-to-text via the Deepgram live API
//!
//! One websocket per call. Caller audio goes up as binary frames; transcript
//! JSON comes back and is mapped to [`TranscriptEvent`]s. Turn endings are
//! detected server-side (endpointing plus optional utterance-end events), so
//! no local voice activity analysis happens in this gateway.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use url::Url;

use crate::config::SpeechConfig;
use crate::{Error, Result};

const KEEPALIVE: &str = r#"{"type":"KeepAlive"}"#;
const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

type LiveSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Transcript-side event produced by the live stream
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// Caller started speaking (server-side VAD)
    SpeechStarted,

    /// Partial hypothesis for the in-flight utterance
    Interim { text: String },

    /// Finalized segment; `speech_final` marks the end of a turn
    Final { text: String, speech_final: bool },

    /// Silence window elapsed after the last finalized word
    UtteranceEnd,

    /// Server closed the stream
    Closed,
}

/// Live transcription stream for one call
pub struct SpeechStream {
    audio_tx: mpsc::Sender<Vec<u8>>,
    events_rx: mpsc::Receiver<TranscriptEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SpeechStream {
    /// Connect a live transcription stream for audio at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the websocket handshake fails.
    pub async fn connect(config: &SpeechConfig, sample_rate: u32) -> Result<Self> {
        let url = live_url(config, sample_rate)?;
        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", config.api_key.expose_secret()))
                .map_err(|_| Error::Stt("API key is not a valid header value".to_string()))?,
        );

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(model = %config.model, sample_rate, "transcription stream connected");

        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let task = tokio::spawn(pump(ws, audio_rx, events_tx));

        Ok(Self {
            audio_tx,
            events_rx,
            task,
        })
    }

    /// Split into the audio sender half and the event receiver half
    #[must_use]
    pub fn split(self) -> (SpeechSender, SpeechEvents) {
        (
            SpeechSender { tx: self.audio_tx },
            SpeechEvents {
                rx: self.events_rx,
                task: self.task,
            },
        )
    }
}

/// Audio-in half of a live stream. Dropping every clone asks the server to
/// flush and close.
#[derive(Clone)]
pub struct SpeechSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl SpeechSender {
    /// Queue one chunk of caller PCM
    ///
    /// # Errors
    ///
    /// Returns error if the stream has already closed.
    pub async fn send(&self, pcm: Vec<u8>) -> Result<()> {
        self.tx
            .send(pcm)
            .await
            .map_err(|_| Error::Stt("transcription stream closed".to_string()))
    }
}

/// Event-out half of a live stream
pub struct SpeechEvents {
    rx: mpsc::Receiver<TranscriptEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SpeechEvents {
    /// Receive the next transcript event. `None` once the stream is done.
    pub async fn next(&mut self) -> Option<TranscriptEvent> {
        self.rx.recv().await
    }

    /// Give the pump a moment to drain, then stop it
    pub async fn shutdown(self) {
        let Self { rx, task } = self;
        drop(rx);
        let abort = task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            abort.abort();
        }
    }
}

/// Forward audio up and transcript events down until either side closes
async fn pump(
    mut ws: LiveSocket,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    events_tx: mpsc::Sender<TranscriptEvent>,
) {
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + KEEPALIVE_INTERVAL,
        KEEPALIVE_INTERVAL,
    );
    let mut audio_done = false;

    loop {
        tokio::select! {
            chunk = audio_rx.recv(), if !audio_done => {
                match chunk {
                    Some(pcm) => {
                        if let Err(e) = ws.send(Message::Binary(pcm.into())).await {
                            tracing::warn!(error = %e, "failed to send audio to transcriber");
                            break;
                        }
                    }
                    None => {
                        // All senders gone; ask the server to flush remaining results
                        audio_done = true;
                        if ws.send(Message::Text(CLOSE_STREAM.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<LiveMessage>(text.as_str()) {
                            Ok(message) => {
                                if let Some(event) = transcript_event(message)
                                    && events_tx.send(event).await.is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "unrecognized transcription message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events_tx.send(TranscriptEvent::Closed).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transcription stream error");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if ws.send(Message::Text(KEEPALIVE.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Build the live endpoint URL with transcription parameters
fn live_url(config: &SpeechConfig, sample_rate: u32) -> Result<String> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| Error::Stt(format!("invalid transcription URL: {e}")))?;

    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("encoding", "linear16")
        .append_pair("sample_rate", &sample_rate.to_string())
        .append_pair("channels", "1")
        .append_pair("interim_results", "true")
        .append_pair("punctuate", "true")
        .append_pair("endpointing", &config.endpointing_ms.to_string());

    if config.vad_enabled {
        url.query_pairs_mut()
            .append_pair("vad_events", "true")
            .append_pair("utterance_end_ms", &config.utterance_end_ms.to_string());
    }

    Ok(url.into())
}

/// Server message on the live websocket
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum LiveMessage {
    Results {
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
        channel: ResultsChannel,
    },
    UtteranceEnd,
    SpeechStarted,
    Metadata,
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct ResultsChannel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
}

/// Map a server message to a transcript event, dropping noise.
/// Empty hypotheses are skipped except when they finalize a turn.
fn transcript_event(message: LiveMessage) -> Option<TranscriptEvent> {
    match message {
        LiveMessage::Results {
            is_final,
            speech_final,
            channel,
        } => {
            let text = channel
                .alternatives
                .first()
                .map(|a| a.transcript.trim().to_string())
                .unwrap_or_default();

            if text.is_empty() && !speech_final {
                return None;
            }
            if is_final {
                Some(TranscriptEvent::Final { text, speech_final })
            } else {
                Some(TranscriptEvent::Interim { text })
            }
        }
        LiveMessage::UtteranceEnd => Some(TranscriptEvent::UtteranceEnd),
        LiveMessage::SpeechStarted => Some(TranscriptEvent::SpeechStarted),
        LiveMessage::Metadata | LiveMessage::Ignored => None,
    }
}
