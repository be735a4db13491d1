//! Raw Telegram Bot API calls

use std::path::Path;

use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;

use super::chunking::{MESSAGE_LIMIT, chunk_text};
use super::types::{
    BotCommand, BotUser, GetFileRequest, SendChatActionRequest, SendMessageRequest,
    SetMyCommandsRequest, TelegramFile, TelegramResponse,
};
use crate::{Error, Result};

impl super::TelegramChannel {
    /// URL of a Bot API method
    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }

    /// URL of a file resolved with getFile
    pub(crate) fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{file_path}",
            self.api_base,
            self.token.expose_secret()
        )
    }

    /// Send a plain-text message to a chat
    ///
    /// Text over Telegram's limit goes out as several messages; only the
    /// first one replies to `reply_to`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        let url = self.method_url("sendMessage");

        for (index, chunk) in chunk_text(text, MESSAGE_LIMIT).iter().enumerate() {
            let request = SendMessageRequest {
                chat_id,
                text: chunk,
                reply_to_message_id: if index == 0 { reply_to } else { None },
                disable_web_page_preview: Some(true),
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::Channel(format!("Telegram API error: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let body_lower = body.to_lowercase();

                if body_lower.contains("chat not found")
                    || body_lower.contains("bot was blocked by the user")
                {
                    return Err(Error::Channel(format!(
                        "Telegram chat {chat_id} not reachable: {body}"
                    )));
                }

                return Err(Error::Channel(format!(
                    "Telegram API error: {status} - {body}"
                )));
            }
        }

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    /// Delete webhook (switch to polling mode)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn delete_webhook(&self) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("deleteWebhook"))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram deleteWebhook error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram deleteWebhook error: {status} - {body}"
            )));
        }

        tracing::info!("Telegram webhook deleted");
        Ok(())
    }

    /// Resolve a `file_id` to the path used for downloading
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or Telegram has no path for the file
    pub async fn get_file(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&GetFileRequest { file_id })
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile error: {e}")))?;

        let parsed: TelegramResponse<TelegramFile> = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile parse error: {e}")))?;

        let file = parsed.into_result("getFile")?;
        let file_path = file.file_path.ok_or_else(|| {
            Error::Channel("Telegram getFile returned no file_path".to_string())
        })?;

        tracing::debug!(file_id, file_path, size = ?file.file_size, "Telegram file resolved");
        Ok(file_path)
    }

    /// Download a resolved file into `dest`, streaming it chunk by chunk
    ///
    /// # Errors
    ///
    /// Returns error if the download fails or `dest` cannot be written
    pub async fn download(&self, file_path: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel(format!(
                "Telegram file download error: {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download read error: {e}")))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(file_path, bytes = written, dest = %dest.display(), "Telegram file downloaded");
        Ok(written)
    }

    /// Upload a local audio file as a voice message
    ///
    /// Telegram shows OGG/Opus, MP3 and M4A uploads as a voice note.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the API request fails
    pub async fn send_voice_file(
        &self,
        chat_id: i64,
        audio_path: &Path,
        caption: Option<&str>,
        reply_to: Option<i64>,
    ) -> Result<()> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("voice.ogg")
            .to_string();
        let mime = voice_mime(audio_path);

        let part = Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| Error::Channel(format!("Telegram sendVoice error: {e}")))?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("voice", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        if let Some(reply_to) = reply_to {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendVoice"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendVoice error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendVoice error: {status} - {body}"
            )));
        }

        tracing::debug!(chat_id, "Telegram voice message sent");
        Ok(())
    }

    /// Sync bot commands with Telegram via `setMyCommands`
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn sync_commands(&self, commands: &[BotCommand]) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("setMyCommands"))
            .json(&SetMyCommandsRequest { commands })
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram setMyCommands error: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram setMyCommands error: {body}"
            )));
        }

        tracing::info!(count = commands.len(), "Telegram bot commands synced");
        Ok(())
    }

    /// Send a chat action (typing indicator, etc.)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("sendChatAction"))
            .json(&SendChatActionRequest { chat_id, action })
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendChatAction error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendChatAction error: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Validate the bot token by calling `getMe`
    ///
    /// Returns the bot's username when Telegram reports one.
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid
    pub async fn get_me(&self) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel("Invalid Telegram bot token".to_string()));
        }

        let parsed: TelegramResponse<BotUser> = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe parse error: {e}")))?;
        let bot = parsed.into_result("getMe")?;

        tracing::debug!(bot_id = bot.id, username = ?bot.username, "Telegram bot identified");
        Ok(bot.username)
    }
}

/// MIME type for an uploaded voice file
fn voice_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "aac") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "audio/ogg",
    }
}
