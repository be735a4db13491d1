//! Speech-to-text via the Whisper transcription API

use std::path::Path;

use reqwest::Method;
use reqwest::multipart::{Form, Part};

use super::ApiClient;
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Response from the transcription endpoint
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes audio files to text
#[derive(Debug)]
pub struct Transcriber {
    api: ApiClient,
    model: String,
    language: Option<String>,
}

impl Transcriber {
    /// Create a transcriber using the configured model and language hint
    #[must_use]
    pub fn new(api: ApiClient, voice: &VoiceConfig) -> Self {
        Self {
            api,
            model: voice.stt_model.clone(),
            language: voice.stt_language.clone(),
        }
    }

    /// Transcribe the audio file at `audio_path`
    ///
    /// The file must exist, be non-empty and carry an extension Whisper
    /// accepts. A failed request is not retried.
    ///
    /// # Errors
    ///
    /// Returns error if the file is unusable or transcription fails
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let extension = supported_extension(audio_path)?;
        let audio = tokio::fs::read(audio_path).await?;
        if audio.is_empty() {
            return Err(Error::backend(
                "empty_audio",
                format!("{} is empty", audio_path.display()),
            ));
        }

        tracing::debug!(
            path = %audio_path.display(),
            audio_bytes = audio.len(),
            "starting transcription"
        );

        let part = Part::bytes(audio)
            .file_name(format!("audio.{extension}"))
            .mime_str(mime_for_extension(extension))
            .map_err(|e| Error::backend("request", e.to_string()))?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        let request = self
            .api
            .request(Method::POST, "/audio/transcriptions")
            .multipart(form);
        let result: TranscriptionResponse = self.api.send_json(request).await?;

        let text = result.text.trim().to_string();
        tracing::info!(chars = text.chars().count(), "transcription complete");
        Ok(text)
    }
}

/// Lowercased extension of `path` if Whisper accepts that container
fn supported_extension(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    SUPPORTED_EXTENSIONS
        .iter()
        .find(|supported| **supported == extension)
        .copied()
        .ok_or_else(|| {
            Error::backend(
                "unsupported_format",
                format!("cannot transcribe '{}'", path.display()),
            )
        })
}

/// Containers accepted by the transcription endpoint
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];

/// MIME type for a supported extension
fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "flac" => "audio/flac",
        "m4a" | "mp4" => "audio/mp4",
        "mp3" | "mpeg" | "mpga" => "audio/mpeg",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        _ => "audio/ogg",
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn accepts_voice_note_containers() {
        assert_eq!(supported_extension(Path::new("temp/voice_1_2.ogg")).unwrap(), "ogg");
        assert_eq!(supported_extension(Path::new("a.OGA")).unwrap(), "oga");
        assert_eq!(supported_extension(Path::new("a.mp3")).unwrap(), "mp3");
    }

    #[test]
    fn rejects_unknown_containers() {
        let err = supported_extension(&PathBuf::from("notes.txt")).unwrap_err();
        assert!(matches!(err, Error::Backend { ref status, .. } if status == "unsupported_format"));
        assert!(supported_extension(Path::new("no_extension")).is_err());
    }

    #[test]
    fn mime_types_for_extensions() {
        assert_eq!(mime_for_extension("ogg"), "audio/ogg");
        assert_eq!(mime_for_extension("oga"), "audio/ogg");
        assert_eq!(mime_for_extension("m4a"), "audio/mp4");
        assert_eq!(mime_for_extension("mpga"), "audio/mpeg");
    }
}
