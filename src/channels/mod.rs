//! Messaging channel adapters
//!
//! The relay talks to its chat platform through the `Channel` trait:
//! inbound messages arrive on an mpsc receiver created by the adapter, and
//! replies, file resolution and downloads go through trait methods.

mod telegram;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use telegram::{BotCommand, TelegramChannel, UpdateDedup, chunk_text};

use crate::Result;

/// Type of attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Voice note recorded in the client
    Voice,
    /// Audio file (MP3, M4A, etc.)
    Audio,
    /// Image file
    Image,
    /// Video file
    Video,
    /// Generic file
    File,
}

impl AttachmentKind {
    /// Determine attachment kind from MIME type
    ///
    /// Never yields `Voice`; voice notes are tagged by the adapter, since
    /// platforms distinguish them from audio files by message type rather
    /// than MIME type.
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        let lower = mime_type.to_lowercase();
        if lower.starts_with("image/") {
            Self::Image
        } else if lower.starts_with("audio/") {
            Self::Audio
        } else if lower.starts_with("video/") {
            Self::Video
        } else {
            Self::File
        }
    }
}

/// An attachment on an incoming message
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Type of attachment
    pub kind: AttachmentKind,

    /// Platform file identifier, resolved with [`Channel::resolve_file`]
    pub file_id: String,

    /// MIME type
    pub mime_type: String,

    /// Original filename
    pub filename: Option<String>,

    /// Duration in seconds, for audio and voice
    pub duration: Option<u32>,
}

impl Attachment {
    /// Create a voice-note attachment
    #[must_use]
    pub fn voice(file_id: impl Into<String>, mime_type: Option<String>, duration: Option<u32>) -> Self {
        Self {
            kind: AttachmentKind::Voice,
            file_id: file_id.into(),
            mime_type: mime_type.unwrap_or_else(|| "audio/ogg".to_string()),
            filename: None,
            duration,
        }
    }

    /// Create an attachment whose kind follows its MIME type
    #[must_use]
    pub fn from_mime(file_id: impl Into<String>, mime_type: String, filename: Option<String>) -> Self {
        Self {
            kind: AttachmentKind::from_mime(&mime_type),
            file_id: file_id.into(),
            mime_type,
            filename,
            duration: None,
        }
    }
}

/// A message from a channel
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier (platform-specific, unique within the chat)
    pub id: String,

    /// Chat identifier
    pub channel_id: String,

    /// Sender identifier
    pub sender_id: String,

    /// Sender display name
    pub sender_name: String,

    /// Message text or caption
    pub content: String,

    /// Whether this is a direct message
    pub is_dm: bool,

    /// Attachments on the message
    pub attachments: Vec<Attachment>,
}

impl IncomingMessage {
    /// The voice note on this message, if any
    #[must_use]
    pub fn voice(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Voice)
    }
}

/// A text message to send to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Chat identifier
    pub channel_id: String,

    /// Message content (plain text)
    pub content: String,

    /// Optional reply-to message ID
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub const fn text(channel_id: String, content: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: None,
        }
    }

    /// Create a `reply` message
    #[must_use]
    pub const fn reply(channel_id: String, content: String, reply_to: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: Some(reply_to),
        }
    }
}

/// A voice note to upload to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingVoice {
    /// Chat identifier
    pub channel_id: String,

    /// Local audio file to upload
    pub audio_path: PathBuf,

    /// Caption shown under the voice note
    pub caption: Option<String>,

    /// Optional reply-to message ID
    pub reply_to: Option<String>,
}

/// Messaging platform adapter
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logging
    fn name(&self) -> &'static str;

    /// Verify credentials and prepare to send
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the credentials or is unreachable
    async fn connect(&mut self) -> Result<()>;

    /// Release the platform session
    ///
    /// # Errors
    ///
    /// Returns error if disconnection fails
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a text message
    ///
    /// # Errors
    ///
    /// Returns error if sending fails
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Resolve a platform file id to a downloadable file path
    ///
    /// # Errors
    ///
    /// Returns error if the platform cannot resolve the file
    async fn resolve_file(&self, file_id: &str) -> Result<String>;

    /// Download a resolved file to `dest`
    ///
    /// # Errors
    ///
    /// Returns error if the download or the local write fails
    async fn download_file(&self, file_path: &str, dest: &Path) -> Result<()>;

    /// Upload a local audio file as a voice note
    ///
    /// # Errors
    ///
    /// Returns error if the upload fails
    async fn send_voice(&self, voice: OutgoingVoice) -> Result<()>;

    /// Show a "recording"/"typing" style activity indicator
    ///
    /// # Errors
    ///
    /// Returns error if the indicator cannot be sent
    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_mime() {
        assert_eq!(AttachmentKind::from_mime("audio/ogg"), AttachmentKind::Audio);
        assert_eq!(AttachmentKind::from_mime("IMAGE/PNG"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_mime("video/mp4"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_mime("application/pdf"), AttachmentKind::File);
    }

    #[test]
    fn voice_lookup_ignores_plain_audio() {
        let mut msg = IncomingMessage {
            id: "7".to_string(),
            channel_id: "42".to_string(),
            sender_id: "42".to_string(),
            sender_name: "Ada".to_string(),
            content: String::new(),
            is_dm: true,
            attachments: vec![Attachment::from_mime("a1", "audio/mpeg".to_string(), None)],
        };
        assert!(msg.voice().is_none());

        msg.attachments.push(Attachment::voice("v1", None, Some(3)));
        let voice = msg.voice().unwrap();
        assert_eq!(voice.file_id, "v1");
        assert_eq!(voice.mime_type, "audio/ogg");
    }
}
