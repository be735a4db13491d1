//! Shared test utilities

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use voice_relay::channels::{
    Attachment, Channel, IncomingMessage, OutgoingMessage, OutgoingVoice,
};
use voice_relay::{Error, RelayConfig, Result, SpeechBackend, VoiceRelay};

/// A call observed by a mock, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send(OutgoingMessage),
    Typing(String),
    ResolveFile(String),
    Download { file_path: String, dest: PathBuf },
    SendVoice { voice: OutgoingVoice, audio: Vec<u8> },
    Transcribe(PathBuf),
    Converse { session: String, text: String },
    Synthesize { text: String, out: PathBuf },
}

/// Ordered log shared by a channel and a backend
pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Mock channel recording every call
pub struct MockChannel {
    log: CallLog,
    pub fail_download: bool,
    pub fail_send_voice: bool,
}

impl MockChannel {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            fail_download: false,
            fail_send_voice: false,
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.log.lock().await.push(Call::Send(message));
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        self.log.lock().await.push(Call::Typing(channel_id.to_string()));
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<String> {
        self.log
            .lock()
            .await
            .push(Call::ResolveFile(file_id.to_string()));
        Ok(format!("voice/{file_id}.oga"))
    }

    /// Writes `audio-<file path>` so transcripts can be traced back to their message
    async fn download_file(&self, file_path: &str, dest: &Path) -> Result<()> {
        self.log.lock().await.push(Call::Download {
            file_path: file_path.to_string(),
            dest: dest.to_path_buf(),
        });
        if self.fail_download {
            tokio::fs::write(dest, b"partial").await?;
            return Err(Error::Channel("connection reset".to_string()));
        }
        tokio::fs::write(dest, format!("audio-{file_path}")).await?;
        Ok(())
    }

    async fn send_voice(&self, voice: OutgoingVoice) -> Result<()> {
        let audio = tokio::fs::read(&voice.audio_path).await?;
        self.log.lock().await.push(Call::SendVoice { voice, audio });
        if self.fail_send_voice {
            return Err(Error::Channel("Telegram sendVoice error: 413".to_string()));
        }
        Ok(())
    }
}

/// Transcription behavior
pub enum Transcript {
    Fixed(String),
    /// Return `heard <file contents>`
    FromFile,
    Fail,
}

/// Conversation behavior
pub enum Reply {
    Fixed(String),
    /// Return `reply to <text>`
    Echo,
    Fail(&'static str),
    Hang,
}

/// Synthesis behavior
pub enum Speech {
    Write(Vec<u8>),
    Fail,
    /// Write the file, then never finish
    WriteThenHang,
}

/// Mock backend recording every call
pub struct MockBackend {
    log: CallLog,
    pub transcript: Transcript,
    pub reply: Reply,
    pub speech: Speech,
}

impl MockBackend {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            transcript: Transcript::Fixed("hello".to_string()),
            reply: Reply::Fixed("hi there".to_string()),
            speech: Speech::Write(vec![0x4f, 0x67, 0x67, 0x53]),
        }
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        self.log
            .lock()
            .await
            .push(Call::Transcribe(audio_path.to_path_buf()));
        let audio = tokio::fs::read_to_string(audio_path).await?;
        match &self.transcript {
            Transcript::Fixed(text) => Ok(text.clone()),
            Transcript::FromFile => Ok(format!("heard {audio}")),
            Transcript::Fail => Err(Error::backend("400", "Invalid file format")),
        }
    }

    async fn converse(&self, session_key: &str, user_text: &str) -> Result<String> {
        self.log.lock().await.push(Call::Converse {
            session: session_key.to_string(),
            text: user_text.to_string(),
        });
        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Echo => Ok(format!("reply to {user_text}")),
            Reply::Fail(status) => Err(Error::backend(*status, "run ended")),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<()> {
        self.log.lock().await.push(Call::Synthesize {
            text: text.to_string(),
            out: out_path.to_path_buf(),
        });
        match &self.speech {
            Speech::Write(bytes) => {
                tokio::fs::write(out_path, bytes).await?;
                Ok(())
            }
            Speech::Fail => Err(Error::backend("500", "speech unavailable")),
            Speech::WriteThenHang => {
                tokio::fs::write(out_path, b"partial").await?;
                std::future::pending().await
            }
        }
    }
}

/// Relay settings without progress echoes and a short deadline
pub fn quiet_config() -> RelayConfig {
    RelayConfig {
        request_timeout: Duration::from_secs(5),
        progress_updates: false,
    }
}

/// Build a relay over the mocks
pub fn relay(
    channel: MockChannel,
    backend: MockBackend,
    temp_dir: &Path,
    config: RelayConfig,
) -> VoiceRelay {
    VoiceRelay::new(
        Arc::new(channel),
        Arc::new(backend),
        temp_dir.to_path_buf(),
        config,
    )
}

/// A voice-note message
pub fn voice_message(chat_id: &str, message_id: &str, file_id: &str) -> IncomingMessage {
    IncomingMessage {
        id: message_id.to_string(),
        channel_id: chat_id.to_string(),
        sender_id: chat_id.to_string(),
        sender_name: "Ada".to_string(),
        content: String::new(),
        is_dm: true,
        attachments: vec![Attachment::voice(file_id, None, Some(2))],
    }
}

/// A text-only message
pub fn text_message(chat_id: &str, message_id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: message_id.to_string(),
        channel_id: chat_id.to_string(),
        sender_id: chat_id.to_string(),
        sender_name: "Ada".to_string(),
        content: text.to_string(),
        is_dm: true,
        attachments: vec![],
    }
}

/// Text of every `send` call
pub fn sent_texts(calls: &[Call]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Send(m) => Some(m.content.clone()),
            _ => None,
        })
        .collect()
}

/// Files left in `dir` (none if it does not exist)
pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}
