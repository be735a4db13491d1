//! Text-to-speech via the speech synthesis API

use std::path::Path;

use reqwest::Method;

use super::{ApiClient, AudioFormat};
use crate::config::VoiceConfig;
use crate::text::truncate_chars;
use crate::{Error, Result};

/// Longest input the speech endpoint accepts, in characters
const MAX_INPUT_CHARS: usize = 4096;

/// Synthesizes speech from text
#[derive(Debug)]
pub struct Synthesizer {
    api: ApiClient,
    model: String,
    voice: String,
    speed: f32,
    format: AudioFormat,
}

impl Synthesizer {
    /// Create a synthesizer using the configured model and voice
    #[must_use]
    pub fn new(api: ApiClient, voice: &VoiceConfig) -> Self {
        Self {
            api,
            model: voice.tts_model.clone(),
            voice: voice.tts_voice.clone(),
            speed: voice.tts_speed,
            format: voice.tts_format,
        }
    }

    /// Container format of synthesized audio
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Synthesize text to speech
    ///
    /// Input longer than the endpoint's limit is cut to fit.
    ///
    /// # Errors
    ///
    /// Returns error if the text is blank or synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        if text.trim().is_empty() {
            return Err(Error::backend("empty_input", "nothing to synthesize"));
        }

        let input = truncate_chars(text, MAX_INPUT_CHARS);
        if input.len() < text.len() {
            tracing::warn!(
                chars = text.chars().count(),
                limit = MAX_INPUT_CHARS,
                "speech input truncated"
            );
        }

        let request = SpeechRequest {
            model: &self.model,
            input,
            voice: &self.voice,
            speed: self.speed,
            response_format: self.format.as_str(),
        };

        let response = self
            .api
            .send(self.api.request(Method::POST, "/audio/speech").json(&request))
            .await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::backend("decode", e.to_string()))?;

        tracing::debug!(audio_bytes = audio.len(), format = %self.format, "speech synthesized");
        Ok(audio.to_vec())
    }

    /// Synthesize text and write the audio to `out_path`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the file cannot be written
    pub async fn synthesize_to_file(&self, text: &str, out_path: &Path) -> Result<()> {
        let audio = self.synthesize(text).await?;
        tokio::fs::write(out_path, &audio).await?;
        Ok(())
    }
}
