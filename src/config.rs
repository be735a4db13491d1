//! Configuration management for the voice relay
//!
//! Settings come from the process environment, optionally seeded from a
//! `.env` file. The two secrets are required; everything else has a default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::backend::AudioFormat;
use crate::relay::RelayConfig;
use crate::{Error, Result};

/// Default `OpenAI` API base URL
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Telegram Bot API base URL
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default assistant instructions
const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant that answers the user's questions. Keep answers short enough to be spoken aloud.";

/// Voice relay configuration
#[derive(Debug)]
pub struct Config {
    /// Telegram bot token
    pub bot_token: SecretString,

    /// `OpenAI` API key (Whisper, Assistants, TTS)
    pub api_key: SecretString,

    /// `OpenAI` API base URL
    pub openai_base_url: String,

    /// Telegram Bot API base URL
    pub telegram_api_base: String,

    /// Working directory for temporary audio files
    pub temp_dir: PathBuf,

    /// Speech-to-text and text-to-speech settings
    pub voice: VoiceConfig,

    /// Conversation backend settings
    pub assistant: AssistantConfig,

    /// Per-request handling settings
    pub relay: RelayConfig,

    /// Pause between `getUpdates` calls
    pub updates_interval: Duration,
}

/// Speech processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Transcription model (e.g. "whisper-1")
    pub stt_model: String,

    /// Language hint (ISO 639-1, e.g. "en")
    pub stt_language: Option<String>,

    /// Speech model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Container of synthesized replies
    pub tts_format: AudioFormat,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            stt_language: None,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            tts_format: AudioFormat::Opus,
        }
    }
}

/// How conversation threads are shared between chats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionScope {
    /// One thread for the whole process
    #[default]
    Global,
    /// One thread per chat
    PerChat,
}

impl FromStr for SessionScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-chat" | "per_chat" | "chat" => Ok(Self::PerChat),
            other => Err(Error::Config(format!(
                "unknown session scope '{other}' (expected 'global' or 'per-chat')"
            ))),
        }
    }
}

/// Assistants API configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Existing assistant to use instead of creating one
    pub assistant_id: Option<String>,

    /// Name for a created assistant
    pub name: String,

    /// Model for a created assistant
    pub model: String,

    /// Instructions for a created assistant
    pub instructions: String,

    /// Thread sharing policy
    pub session_scope: SessionScope,

    /// Delay between run-status checks
    pub poll_interval: Duration,

    /// Upper bound on run-status checks per turn
    pub max_poll_attempts: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            assistant_id: None,
            name: "Voice Assistant".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            session_scope: SessionScope::Global,
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 120,
        }
    }
}

impl Config {
    /// Load configuration from the environment
    ///
    /// With `env_file` set, that file must exist and is loaded first. Without
    /// it, a `.env` in the working directory is loaded when present.
    /// Variables already set in the environment take precedence.
    ///
    /// # Errors
    ///
    /// Returns error if the env file cannot be read or parsed, a secret is
    /// missing, or a value does not parse
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        load_env_file(env_file.unwrap_or(Path::new(".env")), env_file.is_some())?;

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns error if a secret is missing or a value does not parse
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = required(&get, &["BOT_TOKEN", "TELEGRAM_BOT_TOKEN"])?;
        let api_key = required(&get, &["OPENAI_API_KEY", "API_KEY"])?;

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            stt_model: get("VOICE_RELAY_STT_MODEL").unwrap_or(defaults.stt_model),
            stt_language: get("VOICE_RELAY_STT_LANGUAGE"),
            tts_model: get("VOICE_RELAY_TTS_MODEL").unwrap_or(defaults.tts_model),
            tts_voice: get("VOICE_RELAY_TTS_VOICE").unwrap_or(defaults.tts_voice),
            tts_speed: parsed(&get, "VOICE_RELAY_TTS_SPEED", defaults.tts_speed)?,
            tts_format: parsed(&get, "VOICE_RELAY_TTS_FORMAT", defaults.tts_format)?,
        };
        if !(0.25..=4.0).contains(&voice.tts_speed) {
            return Err(Error::Config(format!(
                "VOICE_RELAY_TTS_SPEED must be between 0.25 and 4.0, got {}",
                voice.tts_speed
            )));
        }

        let defaults = AssistantConfig::default();
        let poll_interval_ms: u64 = parsed(
            &get,
            "VOICE_RELAY_POLL_INTERVAL_MS",
            duration_millis(defaults.poll_interval),
        )?;
        let max_poll_attempts: u32 =
            parsed(&get, "VOICE_RELAY_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)?;
        if poll_interval_ms == 0 || max_poll_attempts == 0 {
            return Err(Error::Config(
                "poll interval and max poll attempts must be positive".to_string(),
            ));
        }
        let assistant = AssistantConfig {
            assistant_id: get("VOICE_RELAY_ASSISTANT_ID"),
            name: get("VOICE_RELAY_ASSISTANT_NAME").unwrap_or(defaults.name),
            model: get("VOICE_RELAY_ASSISTANT_MODEL").unwrap_or(defaults.model),
            instructions: get("VOICE_RELAY_ASSISTANT_INSTRUCTIONS")
                .unwrap_or(defaults.instructions),
            session_scope: parsed(&get, "VOICE_RELAY_SESSION_SCOPE", defaults.session_scope)?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_poll_attempts,
        };

        let relay_defaults = RelayConfig::default();
        let timeout_secs: u64 = parsed(
            &get,
            "VOICE_RELAY_REQUEST_TIMEOUT_SECS",
            relay_defaults.request_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(Error::Config(
                "VOICE_RELAY_REQUEST_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        let relay = RelayConfig {
            request_timeout: Duration::from_secs(timeout_secs),
            progress_updates: flag(&get, "VOICE_RELAY_PROGRESS_UPDATES", relay_defaults.progress_updates)?,
        };

        let updates_interval_ms: u64 = parsed(&get, "VOICE_RELAY_UPDATES_INTERVAL_MS", 500)?;

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            api_key: SecretString::from(api_key),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            telegram_api_base: get("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            temp_dir: get("VOICE_RELAY_TEMP_DIR").map_or_else(|| PathBuf::from("temp"), PathBuf::from),
            voice,
            assistant,
            relay,
            updates_interval: Duration::from_millis(updates_interval_ms),
        })
    }
}

/// First non-empty value among `keys`, or a configuration error naming the first
/// Seed the environment from a dotenv file
///
/// A missing file is only an error when `must_exist` is set. A file that
/// exists but does not parse is always an error.
fn load_env_file(path: &Path, must_exist: bool) -> Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "loaded env file");
            Ok(())
        }
        Err(e) if e.not_found() && !must_exist => Ok(()),
        Err(e) => Err(Error::Config(format!(
            "failed to load {}: {e}",
            path.display()
        ))),
    }
}

fn required<F>(get: &F, keys: &[&str]) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|key| get(key))
        .ok_or_else(|| Error::Config(format!("{} is not set", keys[0])))
}

/// Parse an optional variable, falling back to `default` when unset
fn parsed<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| Error::Config(format!("invalid {key} '{raw}': {e}")))
    })
}

/// Parse a boolean flag ("1", "true", "yes", "on" and their negations)
fn flag<F>(get: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("invalid {key} '{raw}': expected a boolean"))),
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
