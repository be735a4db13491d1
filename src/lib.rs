//! Voice relay - spoken conversations with an AI assistant over Telegram
//!
//! A user sends a voice note; the relay transcribes it, runs one turn of an
//! assistant conversation, synthesizes the reply and sends it back as a
//! voice note with the reply text as caption.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            Telegram (getUpdates)              │
//! └──────────────────────┬───────────────────────┘
//!                        │ IncomingMessage
//! ┌──────────────────────▼───────────────────────┐
//! │   Daemon  │  VoiceRelay (one task/message)    │
//! └──────────────────────┬───────────────────────┘
//!                        │ SpeechBackend
//! ┌──────────────────────▼───────────────────────┐
//! │   Whisper  │  Assistants threads  │  TTS      │
//! └──────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod error;
pub mod relay;
pub mod text;

pub use backend::{AudioFormat, OpenAiBackend, SpeechBackend};
pub use channels::{Channel, IncomingMessage, TelegramChannel};
pub use config::{AssistantConfig, Config, SessionScope, VoiceConfig};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use relay::{Outcome, RelayConfig, Stage, VoiceRelay};
