//! Voice request handling
//!
//! One inbound voice note runs through download, transcription, a
//! conversation turn, speech synthesis and upload. Every failure ends the
//! request with a single apology to the user; temp files are released by
//! their guards on every exit, including task abort.

mod temp;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use temp::{TempAudio, ensure_temp_dir, response_path, voice_path};

use crate::backend::SpeechBackend;
use crate::channels::{Attachment, Channel, IncomingMessage, OutgoingMessage, OutgoingVoice};
use crate::text::truncate_chars;
use crate::{Error, Result};

/// Longest caption Telegram displays under a voice note, in characters
pub const CAPTION_LIMIT: usize = 1024;

/// Reply to `/start` and `/help`
pub const GREETING: &str =
    "👋 Hi! I'm a voice AI bot.\nSend me a voice message and I'll answer it!";

/// Reply to anything that is not a voice note
pub const VOICE_PROMPT: &str = "Please send a voice message!";

/// Acknowledgement sent when a voice note arrives
pub const ACKNOWLEDGEMENT: &str = "🎤 Processing your voice message...";

/// Reply when transcription finds no speech
pub const UNRECOGNIZED: &str = "🤷 I couldn't recognize any speech in that message. Please try again.";

/// Reply when a request fails
pub const APOLOGY: &str = "😔 Something went wrong while processing your message. Please try again.";

/// Reply when a request runs out of time
pub const TIMEOUT_APOLOGY: &str = "⏳ That took too long to answer. Please try again later.";

/// Per-request handling settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deadline for one request from download to upload
    pub request_timeout: Duration,

    /// Echo the transcription and the reply text as they become available
    pub progress_updates: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            progress_updates: true,
        }
    }
}

/// Step of the pipeline a request was in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Transcribe,
    Converse,
    Synthesize,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Transcribe => "transcribe",
            Self::Converse => "converse",
            Self::Synthesize => "synthesize",
            Self::Deliver => "deliver",
        };
        f.write_str(name)
    }
}

/// How a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A command was answered with the greeting
    Greeted,
    /// The message had no voice note
    Prompted,
    /// Transcription found no speech
    Unrecognized,
    /// A voice reply was uploaded
    Delivered,
    /// The request failed at `stage`
    Failed {
        stage: Stage,
        timed_out: bool,
    },
}

/// Relays voice notes between a channel and a speech backend
pub struct VoiceRelay {
    channel: Arc<dyn Channel>,
    backend: Arc<dyn SpeechBackend>,
    temp_dir: PathBuf,
    config: RelayConfig,
}

impl fmt::Debug for VoiceRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceRelay")
            .field("channel", &self.channel.name())
            .field("temp_dir", &self.temp_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VoiceRelay {
    /// Create a relay writing temp audio under `temp_dir`
    #[must_use]
    pub fn new(
        channel: Arc<dyn Channel>,
        backend: Arc<dyn SpeechBackend>,
        temp_dir: PathBuf,
        config: RelayConfig,
    ) -> Self {
        Self {
            channel,
            backend,
            temp_dir,
            config,
        }
    }

    /// Route one inbound message
    ///
    /// `/start` and `/help` get the greeting; everything else is handled as
    /// a voice request.
    pub async fn dispatch(&self, message: &IncomingMessage) -> Outcome {
        if matches!(command(&message.content), Some("start" | "help")) {
            self.notify(message, GREETING).await;
            return Outcome::Greeted;
        }
        self.handle(message).await
    }

    /// Handle one voice request end to end
    ///
    /// Never returns an error: failures are logged with the stage they
    /// occurred in and reported to the user once.
    pub async fn handle(&self, message: &IncomingMessage) -> Outcome {
        let Some(voice) = message.voice() else {
            self.notify(message, VOICE_PROMPT).await;
            return Outcome::Prompted;
        };

        tracing::info!(
            chat_id = %message.channel_id,
            message_id = %message.id,
            duration = ?voice.duration,
            "voice message received"
        );

        self.notify(message, ACKNOWLEDGEMENT).await;
        if let Err(e) = self.channel.send_typing(&message.channel_id).await {
            tracing::debug!(error = %e, "activity indicator failed");
        }

        let mut stage = Stage::Download;
        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.pipeline(message, voice, &mut stage),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout(format!(
                "request exceeded {}s",
                self.config.request_timeout.as_secs_f32()
            )))
        });

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let timed_out = e.is_timeout();
                tracing::error!(
                    chat_id = %message.channel_id,
                    message_id = %message.id,
                    stage = %stage,
                    error = %e,
                    "voice request failed"
                );
                let apology = if timed_out { TIMEOUT_APOLOGY } else { APOLOGY };
                self.reply(message, apology).await;
                Outcome::Failed { stage, timed_out }
            }
        }
    }

    /// Download, transcribe, converse, synthesize and deliver
    async fn pipeline(
        &self,
        message: &IncomingMessage,
        voice: &Attachment,
        stage: &mut Stage,
    ) -> Result<Outcome> {
        let chat_id = message.channel_id.as_str();

        *stage = Stage::Download;
        ensure_temp_dir(&self.temp_dir).await?;
        let file_path = self.channel.resolve_file(&voice.file_id).await?;
        let voice_file = TempAudio::new(voice_path(&self.temp_dir, chat_id, &message.id));
        self.channel
            .download_file(&file_path, voice_file.path())
            .await?;

        *stage = Stage::Transcribe;
        let text = self.backend.transcribe(voice_file.path()).await?;
        drop(voice_file);

        if text.trim().is_empty() {
            tracing::info!(chat_id, message_id = %message.id, "no speech recognized");
            self.notify(message, UNRECOGNIZED).await;
            return Ok(Outcome::Unrecognized);
        }
        if self.config.progress_updates {
            self.notify(message, &format!("🎯 Recognized: {text}")).await;
        }

        *stage = Stage::Converse;
        let reply = self.backend.converse(chat_id, &text).await?;
        if self.config.progress_updates {
            self.notify(message, &format!("🤖 Reply: {reply}")).await;
        }

        *stage = Stage::Synthesize;
        let extension = self.backend.reply_format().extension();
        let response_file = TempAudio::new(response_path(
            &self.temp_dir,
            chat_id,
            &message.id,
            extension,
        ));
        self.backend.synthesize(&reply, response_file.path()).await?;

        *stage = Stage::Deliver;
        let caption = truncate_chars(&reply, CAPTION_LIMIT);
        self.channel
            .send_voice(OutgoingVoice {
                channel_id: message.channel_id.clone(),
                audio_path: response_file.path().to_path_buf(),
                caption: (!caption.is_empty()).then(|| caption.to_string()),
                reply_to: Some(message.id.clone()),
            })
            .await?;

        tracing::info!(
            chat_id,
            message_id = %message.id,
            reply_chars = reply.chars().count(),
            "voice reply delivered"
        );
        Ok(Outcome::Delivered)
    }

    /// Send a text message, logging instead of failing
    async fn notify(&self, message: &IncomingMessage, text: &str) {
        let outgoing = OutgoingMessage::text(message.channel_id.clone(), text.to_string());
        self.deliver(message, outgoing).await;
    }

    /// Answer the inbound message directly, logging instead of failing
    async fn reply(&self, message: &IncomingMessage, text: &str) {
        let outgoing = OutgoingMessage::reply(
            message.channel_id.clone(),
            text.to_string(),
            message.id.clone(),
        );
        self.deliver(message, outgoing).await;
    }

    async fn deliver(&self, message: &IncomingMessage, outgoing: OutgoingMessage) {
        if let Err(e) = self.channel.send(outgoing).await {
            tracing::warn!(chat_id = %message.channel_id, error = %e, "failed to send status message");
        }
    }
}

/// Command name of a `/command` or `/command@botname` message
fn command(content: &str) -> Option<&str> {
    let token = content.split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(command("/start"), Some("start"));
        assert_eq!(command("  /start@voice_bot extra"), Some("start"));
        assert_eq!(command("/help"), Some("help"));
        assert_eq!(command("start"), None);
        assert_eq!(command("/"), None);
        assert_eq!(command(""), None);
    }

    #[test]
    fn caption_limit_keeps_first_chars() {
        let reply: String = "абв".repeat(700);
        let caption = truncate_chars(&reply, CAPTION_LIMIT);
        assert_eq!(caption.chars().count(), CAPTION_LIMIT);
        assert!(reply.starts_with(caption));
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Converse.to_string(), "converse");
        assert_eq!(Stage::Deliver.to_string(), "deliver");
    }

    #[test]
    fn default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert!(config.progress_updates);
    }
}
