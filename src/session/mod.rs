//! Call session orchestration
//!
//! One session per media stream. The session owns the conversation
//! transcript, feeds caller audio into the transcriber, turns finalized
//! utterances into chat completions, and speaks replies back as paced
//! 20 ms media frames. It runs as a single sequential turn loop; audio
//! routing and playback pacing happen in side tasks.

pub mod transcript;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::telephony::protocol::{self, OutboundFrame, StreamEvent};
use crate::voice::{ChatClient, SpeechSender, SpeechStream, Synthesizer, TranscriptEvent};
use crate::{Error, Result};

pub use transcript::Transcript;

/// Throwaway text synthesized once per session to open the TTS path
/// before the greeting needs it
const WARM_UP_TEXT: &str = "warming up";

/// An active voice conversation bound to one media stream
pub struct CallSession {
    config: Arc<Config>,
    stream_sid: String,
    call_sid: String,
    transcript: Transcript,
    chat: ChatClient,
    tts: Arc<Synthesizer>,
}

impl CallSession {
    /// Create a session for an announced stream
    ///
    /// # Errors
    ///
    /// Returns error if a speech service client cannot be constructed.
    pub fn new(config: Arc<Config>, stream_sid: String, call_sid: String) -> Result<Self> {
        let transcript = Transcript::new(&config.session.system_prompt);
        let chat = ChatClient::new(&config.llm)?;
        let tts = Arc::new(Synthesizer::new(&config.tts, config.session.sample_rate)?);

        Ok(Self {
            config,
            stream_sid,
            call_sid,
            transcript,
            chat,
            tts,
        })
    }

    /// Drive the call to completion. Consumes the socket.
    ///
    /// Ends when the provider sends `stop`, the socket closes, or an
    /// unrecoverable error occurs; the error is also logged here so the
    /// connection handler can treat any return as end-of-session.
    ///
    /// # Errors
    ///
    /// Returns error if the transcription stream fails or a completion
    /// request cannot be satisfied.
    pub async fn run(mut self, socket: WebSocket) -> Result<()> {
        tracing::info!(
            stream_sid = %self.stream_sid,
            call_sid = %self.call_sid,
            "call session started"
        );

        let stream =
            SpeechStream::connect(&self.config.speech, self.config.session.sample_rate).await?;
        let (audio_tx, mut events) = stream.split();

        let (sender, receiver) = socket.split();

        // Writer task is the single owner of the socket sink
        let (frame_tx, frame_rx) = mpsc::channel::<OutboundFrame>(256);
        let writer = tokio::spawn(write_frames(sender, frame_rx));

        // Reader task routes caller frames until the stream stops
        let (control_tx, mut control_rx) = mpsc::channel::<SessionControl>(16);
        let reader = tokio::spawn(read_frames(receiver, audio_tx, control_tx));

        let speaker = Speaker::spawn(
            Arc::clone(&self.tts),
            frame_tx,
            self.stream_sid.clone(),
            self.config.session.sample_rate,
        );

        self.warm_up().await;
        speaker.say(self.config.session.greeting.clone()).await;

        let mut pending = PendingTurn::default();
        let outcome = loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => {
                        if let Err(e) = self
                            .handle_transcript_event(event, &mut pending, &speaker)
                            .await
                        {
                            break Err(e);
                        }
                    }
                    None => break Err(Error::Stt("transcription stream ended mid-call".to_string())),
                },
                control = control_rx.recv() => match control {
                    Some(SessionControl::Stop { reason }) => {
                        tracing::info!(
                            stream_sid = %self.stream_sid,
                            reason = reason.as_deref().unwrap_or("unspecified"),
                            "provider stopped the stream"
                        );
                        break Ok(());
                    }
                    Some(SessionControl::Closed) | None => {
                        tracing::info!(stream_sid = %self.stream_sid, "media socket closed");
                        break Ok(());
                    }
                },
            }
        };

        speaker.stop().await;
        reader.abort();
        events.shutdown().await;
        writer.abort();

        match &outcome {
            Ok(()) => tracing::info!(
                stream_sid = %self.stream_sid,
                call_sid = %self.call_sid,
                turns = self.transcript.turn_count(),
                "call session ended"
            ),
            Err(e) => tracing::error!(
                stream_sid = %self.stream_sid,
                call_sid = %self.call_sid,
                error = %e,
                "call session failed"
            ),
        }

        outcome
    }

    /// Best-effort TTS warm-up; the audio is discarded
    async fn warm_up(&self) {
        let started = std::time::Instant::now();
        match self.tts.synthesize(WARM_UP_TEXT).await {
            Ok(_) => tracing::debug!(
                stream_sid = %self.stream_sid,
                elapsed = ?started.elapsed(),
                "TTS warm-up complete"
            ),
            Err(e) => tracing::warn!(
                stream_sid = %self.stream_sid,
                error = %e,
                "TTS warm-up failed, continuing"
            ),
        }
    }

    async fn handle_transcript_event(
        &mut self,
        event: TranscriptEvent,
        pending: &mut PendingTurn,
        speaker: &Speaker,
    ) -> Result<()> {
        match event {
            // Caller speech over bot playback is a barge-in when enabled;
            // interim hypotheses double as the signal when VAD events are off
            TranscriptEvent::SpeechStarted | TranscriptEvent::Interim { .. } => {
                if self.config.session.enable_interruptions && speaker.is_speaking() {
                    tracing::debug!(stream_sid = %self.stream_sid, "caller barged in");
                    speaker.interrupt();
                }
            }
            TranscriptEvent::Final { text, speech_final } => {
                pending.push(&text);
                if speech_final {
                    self.take_turn(pending, speaker).await?;
                }
            }
            TranscriptEvent::UtteranceEnd => {
                self.take_turn(pending, speaker).await?;
            }
            TranscriptEvent::Closed => {
                return Err(Error::Stt(
                    "transcription stream closed mid-call".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Finalize the pending user turn, get a reply, and queue it for playback
    async fn take_turn(&mut self, pending: &mut PendingTurn, speaker: &Speaker) -> Result<()> {
        let Some(text) = pending.take() else {
            return Ok(());
        };

        tracing::info!(stream_sid = %self.stream_sid, text = %text, "user turn");
        self.transcript.push_user(text);

        let reply = self.chat.complete(self.transcript.messages()).await?;
        tracing::info!(stream_sid = %self.stream_sid, text = %reply, "assistant turn");
        self.transcript.push_assistant(reply.clone());

        speaker.say(reply).await;
        Ok(())
    }
}

/// End-of-stream signals from the reader task
enum SessionControl {
    Stop { reason: Option<String> },
    Closed,
}

/// Aggregates finalized transcript segments into one user turn
#[derive(Debug, Default)]
struct PendingTurn {
    parts: Vec<String>,
}

impl PendingTurn {
    fn push(&mut self, text: &str) {
        if !text.is_empty() {
            self.parts.push(text.to_string());
        }
    }

    fn take(&mut self) -> Option<String> {
        if self.parts.is_empty() {
            return None;
        }
        let joined = self.parts.join(" ");
        self.parts.clear();
        Some(joined)
    }
}

/// Route inbound stream frames: audio to the transcriber, stop/close out
async fn read_frames(
    mut receiver: SplitStream<WebSocket>,
    audio: SpeechSender,
    control: mpsc::Sender<SessionControl>,
) {
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<StreamEvent>(text.as_str()) {
                Ok(StreamEvent::Media { media }) => match media.decode() {
                    Ok(pcm) => {
                        if audio.send(pcm).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable media frame"),
                },
                Ok(StreamEvent::Dtmf { dtmf }) => {
                    tracing::info!(digit = %dtmf.digit, "dtmf received");
                }
                Ok(StreamEvent::Stop { stop }) => {
                    let reason = stop.and_then(|s| s.reason);
                    let _ = control.send(SessionControl::Stop { reason }).await;
                    return;
                }
                Ok(StreamEvent::Mark { mark }) => {
                    if let Some(mark) = mark {
                        tracing::debug!(name = %mark.name, "playback mark acknowledged");
                    }
                }
                Ok(StreamEvent::Start { .. }) => {
                    tracing::debug!("duplicate start event ignored");
                }
                Ok(StreamEvent::Connected | StreamEvent::Unhandled) => {}
                Err(e) => tracing::warn!(error = %e, "malformed stream frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    let _ = control.send(SessionControl::Closed).await;
}

/// Serialize outbound frames onto the socket
async fn write_frames(mut sender: SplitSink<WebSocket, Message>, mut frames: mpsc::Receiver<OutboundFrame>) {
    while let Some(frame) = frames.recv().await {
        match frame.to_text() {
            Ok(text) => {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode outbound frame"),
        }
    }
}

/// Sequential speech playback with barge-in support.
///
/// Utterances queue in order; `interrupt` aborts the one playing, flushes
/// the provider's buffer with a `clear` frame, and drops anything queued
/// behind it.
struct Speaker {
    texts: mpsc::Sender<String>,
    cancel: mpsc::Sender<()>,
    speaking: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl Speaker {
    fn spawn(
        tts: Arc<Synthesizer>,
        frames: mpsc::Sender<OutboundFrame>,
        stream_sid: String,
        sample_rate: u32,
    ) -> Self {
        let (texts_tx, texts_rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let speaking = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(speak_loop(
            tts,
            frames,
            stream_sid,
            sample_rate,
            texts_rx,
            cancel_rx,
            Arc::clone(&speaking),
        ));

        Self {
            texts: texts_tx,
            cancel: cancel_tx,
            speaking,
            task,
        }
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Queue an utterance for playback
    async fn say(&self, text: String) {
        let _ = self.texts.send(text).await;
    }

    /// Cut off the utterance currently playing
    fn interrupt(&self) {
        let _ = self.cancel.try_send(());
    }

    async fn stop(self) {
        let Self { texts, cancel, task, .. } = self;
        drop(texts);
        drop(cancel);
        let abort = task.abort_handle();
        if tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .is_err()
        {
            abort.abort();
        }
    }
}

async fn speak_loop(
    tts: Arc<Synthesizer>,
    frames: mpsc::Sender<OutboundFrame>,
    stream_sid: String,
    sample_rate: u32,
    mut texts: mpsc::Receiver<String>,
    mut cancel: mpsc::Receiver<()>,
    speaking: Arc<AtomicBool>,
) {
    while let Some(text) = texts.recv().await {
        // Stale cancellations from before this utterance don't apply to it
        while cancel.try_recv().is_ok() {}

        speaking.store(true, Ordering::SeqCst);
        let interrupted = tokio::select! {
            () = speak_one(&tts, &frames, &stream_sid, sample_rate, &text) => false,
            _ = cancel.recv() => true,
        };

        if interrupted {
            tracing::debug!(stream_sid = %stream_sid, "playback interrupted");
            let _ = frames.send(OutboundFrame::clear(&stream_sid)).await;
            while texts.try_recv().is_ok() {}
        }
        speaking.store(false, Ordering::SeqCst);
    }
}

/// Synthesize one utterance and pace its frames onto the stream
async fn speak_one(
    tts: &Synthesizer,
    frames: &mpsc::Sender<OutboundFrame>,
    stream_sid: &str,
    sample_rate: u32,
    text: &str,
) {
    let pcm = match tts.synthesize(text).await {
        Ok(pcm) => pcm,
        Err(e) => {
            tracing::error!(error = %e, "synthesis failed, dropping utterance");
            return;
        }
    };

    let gap = Duration::from_millis(u64::from(protocol::FRAME_MS));
    for frame in protocol::audio_frames(&pcm, sample_rate) {
        if frames
            .send(OutboundFrame::media(stream_sid, frame))
            .await
            .is_err()
        {
            return;
        }
        tokio::time::sleep(gap).await;
    }

    let mark = format!("utt-{}", uuid::Uuid::new_v4());
    let _ = frames.send(OutboundFrame::mark(stream_sid, &mark)).await;
}
