//! Speech service clients
//!
//! One thin client per concern: streaming transcription, chat completion,
//! and speech synthesis. Base URLs are configurable; the defaults point at
//! the hosted APIs.

pub mod llm;
pub mod stt;
pub mod tts;

pub use llm::{ChatClient, ChatMessage};
pub use stt::{SpeechEvents, SpeechSender, SpeechStream, TranscriptEvent};
pub use tts::Synthesizer;
