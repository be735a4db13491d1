//! Speech and conversation backend
//!
//! Three remote operations drive a relay turn: transcription, a turn of a
//! stateful assistant conversation, and speech synthesis. `SpeechBackend`
//! is the seam the relay depends on; `OpenAiBackend` implements it against
//! the `OpenAI` HTTP API.

mod assistant;
mod stt;
mod tts;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::config::{AssistantConfig, VoiceConfig};
use crate::{Error, Result};

pub use assistant::{Assistant, ConversationSession, RunStatus};
pub use stt::Transcriber;
pub use tts::Synthesizer;

/// Speech and conversation operations used by the relay
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Transcribe the audio file at `audio_path` to text
    ///
    /// # Errors
    ///
    /// Returns error if the file is unusable or the remote call fails
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    /// Run one conversation turn and return the assistant's reply
    ///
    /// `session_key` identifies the caller (the chat id); whether it selects
    /// a distinct conversation depends on the backend's session scope.
    ///
    /// # Errors
    ///
    /// Returns error if the run fails, ends in a non-success status, or does
    /// not finish within the poll bound
    async fn converse(&self, session_key: &str, user_text: &str) -> Result<String>;

    /// Synthesize `text` and write the audio to `out_path`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the file cannot be written
    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<()>;

    /// Container format written by `synthesize`
    fn reply_format(&self) -> AudioFormat {
        AudioFormat::Opus
    }
}

/// Audio container produced by speech synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// Opus in an Ogg container (what Telegram renders as a voice note)
    #[default]
    Opus,
    /// MP3
    Mp3,
    /// AAC
    Aac,
    /// FLAC
    Flac,
    /// Uncompressed WAV
    Wav,
}

impl AudioFormat {
    /// Value of the API's `response_format` field
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    /// File extension for a file in this format
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Opus => "ogg",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "opus" | "ogg" => Ok(Self::Opus),
            "mp3" => Ok(Self::Mp3),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            other => Err(Error::Config(format!("unsupported audio format '{other}'"))),
        }
    }
}

/// Authenticated HTTP access to the `OpenAI` API
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Arc<SecretString>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    #[must_use]
    pub fn new(base_url: &str, api_key: &SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Arc::new(SecretString::from(api_key.expose_secret().to_owned())),
        }
    }

    /// Start an authenticated request to `path` (relative to the base URL)
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
    }

    /// Send a request, mapping transport failures and non-2xx statuses to
    /// backend errors
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::backend("request", e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, body = %body, "OpenAI API error");
        Err(Error::backend(status.as_u16().to_string(), api_error_message(&body)))
    }

    /// Send a request and decode a JSON response
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| Error::backend("decode", e.to_string()))
    }
}

/// Pull `error.message` out of an `OpenAI` error body, or return the body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("message")?.as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

/// `OpenAI`-backed implementation of [`SpeechBackend`]
#[derive(Debug)]
pub struct OpenAiBackend {
    transcriber: Transcriber,
    assistant: Assistant,
    synthesizer: Synthesizer,
}

impl OpenAiBackend {
    /// Create a backend sharing one HTTP client across the three services
    #[must_use]
    pub fn new(api: &ApiClient, voice: &VoiceConfig, assistant: AssistantConfig) -> Self {
        Self {
            transcriber: Transcriber::new(api.clone(), voice),
            assistant: Assistant::new(api.clone(), assistant),
            synthesizer: Synthesizer::new(api.clone(), voice),
        }
    }

    /// The conversation client
    #[must_use]
    pub const fn assistant(&self) -> &Assistant {
        &self.assistant
    }
}

#[async_trait]
impl SpeechBackend for OpenAiBackend {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        self.transcriber.transcribe(audio_path).await
    }

    async fn converse(&self, session_key: &str, user_text: &str) -> Result<String> {
        self.assistant.converse(session_key, user_text).await
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<()> {
        self.synthesizer.synthesize_to_file(text, out_path).await
    }

    fn reply_format(&self) -> AudioFormat {
        self.synthesizer.format()
    }
}
