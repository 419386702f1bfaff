//! Exovoice Gateway - Exotel telephony gateway for real-time voice AI calls
//!
//! This library provides the core functionality for the gateway:
//! - Exotel media stream transport (bidirectional PCM over websocket)
//! - Outbound call triggering through a pre-existing voice app
//! - Streaming speech-to-text, chat completion, and speech synthesis
//! - Per-call session orchestration with barge-in support
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Exotel                          │
//! │   Calls API  │  voice app (flow)  │  media stream   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Exovoice Gateway                      │
//! │   REST trigger  │  call sessions  │  audio pacing   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Speech services                      │
//! │   Deepgram STT  │  OpenAI chat  │  Cartesia TTS     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod telephony;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
