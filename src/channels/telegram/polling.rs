//! Telegram polling mode: getUpdates loop and message conversion

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;

use super::TelegramChannel;
use super::dedup::UpdateDedup;
use super::types::{GetUpdatesRequest, TelegramResponse};
use crate::channels::{Attachment, IncomingMessage};
use crate::{Error, Result};

/// Server-side long-poll window for getUpdates, in seconds
const LONG_POLL_SECS: u64 = 30;

/// Pause after a failed getUpdates call
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A single update from getUpdates
#[derive(Debug, Deserialize)]
pub(crate) struct PollingUpdate {
    update_id: i64,
    message: Option<PollingMessage>,
}

/// Message from a polling update
#[derive(Debug, Deserialize)]
struct PollingMessage {
    message_id: i64,
    chat: PollingChat,
    from: Option<PollingUser>,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<PollingFile>>,
    document: Option<PollingDocument>,
    voice: Option<PollingVoice>,
    audio: Option<PollingAudio>,
    video: Option<PollingFile>,
}

/// Any file reference carrying only an id
#[derive(Debug, Deserialize)]
struct PollingFile {
    file_id: String,
    mime_type: Option<String>,
}

/// Document from polling
#[derive(Debug, Deserialize)]
struct PollingDocument {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
}

/// Voice note from polling
#[derive(Debug, Deserialize)]
struct PollingVoice {
    file_id: String,
    duration: Option<u32>,
    mime_type: Option<String>,
}

/// Audio file from polling
#[derive(Debug, Deserialize)]
struct PollingAudio {
    file_id: String,
    title: Option<String>,
    mime_type: Option<String>,
}

/// Chat info from polling
#[derive(Debug, Deserialize)]
struct PollingChat {
    id: i64,
    #[serde(rename = "type")]
    chat_type: String,
}

/// User info from polling
#[derive(Debug, Deserialize)]
struct PollingUser {
    id: i64,
    is_bot: bool,
    first_name: String,
}

impl TelegramChannel {
    /// Spawn a background task that polls Telegram's getUpdates API
    ///
    /// Waits `interval` between calls and forwards received messages into
    /// the receiver returned by [`TelegramChannel::with_receiver`]. Deletes
    /// any existing webhook first, since Telegram refuses getUpdates while
    /// one is set. The task ends when the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the channel was built without a receiver
    pub fn start_polling(&self, interval: Duration) -> Result<tokio::task::JoinHandle<()>> {
        let tx = self.message_tx.clone().ok_or_else(|| {
            Error::Channel("polling requires a message receiver (use with_receiver)".to_string())
        })?;
        let channel = self.clone();

        Ok(tokio::spawn(async move {
            channel.polling_loop(tx, interval).await;
        }))
    }

    /// Run the polling loop (background task)
    async fn polling_loop(&self, tx: mpsc::Sender<IncomingMessage>, interval: Duration) {
        if let Err(e) = self.delete_webhook().await {
            tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
        }

        let mut offset: Option<i64> = None;
        let mut dedup = UpdateDedup::default();

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram getUpdates error");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in &updates {
                // Advance offset past this update
                offset = Some(update.update_id + 1);

                if dedup.is_duplicate(update.update_id) {
                    tracing::debug!(update_id = update.update_id, "skipping duplicate update");
                    continue;
                }

                if let Some(msg) = update_to_incoming(update)
                    && tx.send(msg).await.is_err()
                {
                    tracing::info!("message receiver closed, stopping Telegram polling");
                    return;
                }
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch pending updates after `offset`
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<PollingUpdate>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: &["message"],
        };

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&request)
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getUpdates error: {e}")))?;

        let parsed: TelegramResponse<Vec<PollingUpdate>> = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getUpdates parse error: {e}")))?;

        parsed.into_result("getUpdates")
    }
}

/// Collect the attachments on a polling message
fn extract_attachments(msg: &PollingMessage) -> Vec<Attachment> {
    let mut attachments = Vec::new();

    if let Some(voice) = &msg.voice {
        attachments.push(Attachment::voice(
            voice.file_id.clone(),
            voice.mime_type.clone(),
            voice.duration,
        ));
    }

    if let Some(audio) = &msg.audio {
        attachments.push(Attachment::from_mime(
            audio.file_id.clone(),
            audio.mime_type.clone().unwrap_or_else(|| "audio/mpeg".to_string()),
            audio.title.clone(),
        ));
    }

    // Photo: pick largest size (last in array)
    if let Some(largest) = msg.photo.as_ref().and_then(|p| p.last()) {
        attachments.push(Attachment::from_mime(
            largest.file_id.clone(),
            "image/jpeg".to_string(),
            None,
        ));
    }

    if let Some(video) = &msg.video {
        attachments.push(Attachment::from_mime(
            video.file_id.clone(),
            video.mime_type.clone().unwrap_or_else(|| "video/mp4".to_string()),
            None,
        ));
    }

    if let Some(doc) = &msg.document {
        attachments.push(Attachment::from_mime(
            doc.file_id.clone(),
            doc.mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            doc.file_name.clone(),
        ));
    }

    attachments
}

/// Convert a polling update into an `IncomingMessage`
///
/// Skips non-message updates and messages from bots. Messages with nothing
/// the relay can read (stickers, locations, polls) still come through with
/// empty content so they can be answered.
fn update_to_incoming(update: &PollingUpdate) -> Option<IncomingMessage> {
    let msg = update.message.as_ref()?;

    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return None;
    }

    let attachments = extract_attachments(msg);
    let text = msg.text.as_ref().or(msg.caption.as_ref());

    let sender_id = msg
        .from
        .as_ref()
        .map_or_else(|| msg.chat.id.to_string(), |u| u.id.to_string());

    let sender_name = msg
        .from
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |u| u.first_name.clone());

    Some(IncomingMessage {
        id: msg.message_id.to_string(),
        channel_id: msg.chat.id.to_string(),
        sender_id,
        sender_name,
        content: text.cloned().unwrap_or_default(),
        is_dm: msg.chat.chat_type == "private",
        attachments,
    })
}
