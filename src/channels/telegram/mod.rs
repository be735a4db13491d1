//! Telegram channel adapter
//!
//! Receives messages by long-polling getUpdates and sends through the Bot API

mod api;
mod chunking;
mod dedup;
mod polling;
mod types;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use super::{Channel, IncomingMessage, OutgoingMessage, OutgoingVoice};
use crate::{Error, Result};

pub use chunking::chunk_text;
pub use dedup::UpdateDedup;
pub use types::BotCommand;

/// Buffered inbound messages before polling applies backpressure
const INBOUND_BUFFER: usize = 100;

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    token: Arc<SecretString>,
    api_base: Arc<str>,
    client: Client,
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    connected: bool,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a new Telegram channel adapter
    #[must_use]
    pub fn new(token: &SecretString) -> Self {
        Self {
            token: Arc::new(SecretString::from(token.expose_secret().to_owned())),
            api_base: Arc::from(types::DEFAULT_API_BASE),
            client: Client::new(),
            message_tx: None,
            connected: false,
        }
    }

    /// Create with a message receiver for polling mode
    ///
    /// Returns the channel and a receiver for incoming messages
    #[must_use]
    pub fn with_receiver(token: &SecretString) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let mut channel = Self::new(token);
        channel.message_tx = Some(tx);
        (channel, rx)
    }

    /// Point the adapter at another Bot API host
    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = Arc::from(api_base.trim_end_matches('/'));
        self
    }

    /// Whether `connect` has succeeded
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Parse a chat identifier
fn parse_chat_id(channel_id: &str) -> Result<i64> {
    channel_id
        .parse()
        .map_err(|_| Error::Channel(format!("Invalid chat ID: {channel_id}")))
}

/// Parse an optional message identifier, dropping anything non-numeric
fn parse_message_id(message_id: Option<&String>) -> Option<i64> {
    message_id.and_then(|id| id.parse().ok())
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        let username = self.get_me().await?;
        self.connected = true;
        tracing::info!(username = ?username, "Telegram channel connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        tracing::info!("Telegram channel disconnected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let chat_id = parse_chat_id(&message.channel_id)?;
        let reply_to = parse_message_id(message.reply_to.as_ref());
        self.send_message(chat_id, &message.content, reply_to).await
    }

    async fn resolve_file(&self, file_id: &str) -> Result<String> {
        self.get_file(file_id).await
    }

    async fn download_file(&self, file_path: &str, dest: &Path) -> Result<()> {
        self.download(file_path, dest).await.map(|_| ())
    }

    async fn send_voice(&self, voice: OutgoingVoice) -> Result<()> {
        let chat_id = parse_chat_id(&voice.channel_id)?;
        let reply_to = parse_message_id(voice.reply_to.as_ref());
        self.send_voice_file(chat_id, &voice.audio_path, voice.caption.as_deref(), reply_to)
            .await
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        let chat_id = parse_chat_id(channel_id)?;
        self.send_chat_action(chat_id, "typing").await?;
        tracing::debug!(chat_id, "Telegram typing indicator sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let channel = TelegramChannel::new(&SecretString::from("123:very-secret".to_string()));
        let debug = format!("{channel:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("api.telegram.org"));
    }

    #[test]
    fn chat_ids_must_be_numeric() {
        assert_eq!(parse_chat_id("-1001234").unwrap(), -1_001_234);
        assert!(parse_chat_id("general").is_err());
        assert_eq!(parse_message_id(Some(&"77".to_string())), Some(77));
        assert_eq!(parse_message_id(Some(&"x".to_string())), None);
    }

    #[tokio::test]
    async fn polling_requires_receiver() {
        let channel = TelegramChannel::new(&SecretString::from("t".to_string()));
        assert!(channel.start_polling(std::time::Duration::from_secs(1)).is_err());
    }
}
